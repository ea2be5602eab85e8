use std::path::PathBuf;

use ccmo_common::settings::Settings;
use clap::Parser;
use tracing::info;

use crate::error::CliResult;

#[derive(Parser, Debug, Clone)]
pub struct OperatorArgs {
    /// Namespace the cloud controller manager is deployed into.
    #[arg(long, env = "CCMO_MANAGED_NAMESPACE")]
    pub namespace: Option<String>,

    #[arg(long)]
    pub images_json: Option<PathBuf>,

    #[arg(long)]
    pub leader_elect: Option<bool>,

    #[arg(long)]
    pub leader_elect_resource_namespace: Option<String>,
}

impl OperatorArgs {
    pub fn merge_with_config(&self, config: &Settings) -> Settings {
        let mut settings = config.clone();
        if let Some(namespace) = &self.namespace {
            settings.managed_namespace = namespace.clone();
        }
        if let Some(images) = &self.images_json {
            settings.images_file = images.clone();
        }
        if let Some(enabled) = self.leader_elect {
            settings.leader_election.enabled = enabled;
        }
        if let Some(namespace) = &self.leader_elect_resource_namespace {
            settings.leader_election.namespace = namespace.clone();
        }
        settings
    }
}

pub async fn run(args: &OperatorArgs, config: &Settings) -> CliResult {
    let settings = args.merge_with_config(config);
    info!(build = %ccmo_operator::build_info(), "Starting operator");
    ccmo_operator::run_operator(&settings).await?;
    Ok(())
}
