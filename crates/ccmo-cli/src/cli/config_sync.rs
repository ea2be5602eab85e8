use std::path::PathBuf;

use ccmo_common::settings::Settings;
use clap::Parser;
use tracing::info;

use crate::error::CliResult;

#[derive(Parser, Debug, Clone)]
pub struct ConfigSyncArgs {
    #[arg(long, env = "CCMO_MANAGED_NAMESPACE")]
    pub namespace: Option<String>,

    /// System trust bundle merged into the published CA bundle.
    #[arg(long)]
    pub trust_bundle_path: Option<PathBuf>,

    #[arg(long)]
    pub leader_elect: Option<bool>,
}

impl ConfigSyncArgs {
    pub fn merge_with_config(&self, config: &Settings) -> Settings {
        let mut settings = config.clone();
        if let Some(namespace) = &self.namespace {
            settings.managed_namespace = namespace.clone();
        }
        if self.trust_bundle_path.is_some() {
            settings.trust_bundle_path = self.trust_bundle_path.clone();
        }
        if let Some(enabled) = self.leader_elect {
            settings.leader_election.enabled = enabled;
        }
        settings
    }
}

pub async fn run(args: &ConfigSyncArgs, config: &Settings) -> CliResult {
    let settings = args.merge_with_config(config);
    info!(build = %ccmo_operator::build_info(), "Starting config sync controllers");
    ccmo_operator::run_config_sync(&settings).await?;
    Ok(())
}
