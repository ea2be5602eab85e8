use std::path::PathBuf;

use ccmo_common::settings::Settings;
use clap::Parser;
use tracing::info;

use crate::error::CliResult;

#[derive(Parser, Debug, Clone)]
pub struct RenderArgs {
    /// Directory the rendered manifests are written to.
    #[arg(long)]
    pub dest_dir: PathBuf,

    /// Infrastructure object, YAML or JSON.
    #[arg(long)]
    pub cluster_infrastructure_file: PathBuf,

    /// Defaults to the configured images file.
    #[arg(long)]
    pub images_file: Option<PathBuf>,
}

pub fn run(args: &RenderArgs, config: &Settings) -> CliResult {
    let images_file = args.images_file.as_ref().unwrap_or(&config.images_file);
    let written = ccmo_operator::render::render(
        &args.dest_dir,
        &args.cluster_infrastructure_file,
        images_file,
        &config.managed_namespace,
    )?;
    for path in written {
        info!("Wrote {}", path.display());
    }
    Ok(())
}
