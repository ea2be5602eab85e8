use std::path::PathBuf;

use ccmo_common::{metadata::LevelFilter, util::tracing::setup_tracing};
use clap::Parser;

use crate::{error::CliResult, init::init_config};

mod config_sync;
mod credentials_injector;
mod operator;
mod render;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    #[clap(short('l'), long, value_name("LEVEL"), default_value("info"))]
    pub log_level: LevelFilter,

    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Parser, Clone)]
pub enum Command {
    #[command(about = "Run the cluster cloud controller manager operator")]
    Operator(operator::OperatorArgs),
    #[command(about = "Run the cloud config and trusted CA sync controllers")]
    ConfigSync(config_sync::ConfigSyncArgs),
    #[command(about = "Render the platform manifests into a directory")]
    Render(render::RenderArgs),
    #[command(about = "Inject Azure credentials into a cloud config file")]
    AzureConfigCredentialsInjector(credentials_injector::InjectorArgs),
}

pub async fn exec() -> CliResult {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    setup_tracing(Some(cli.log_level));

    match cli.cmd {
        // Runs inside an init container, no settings involved.
        Command::AzureConfigCredentialsInjector(ref args) => credentials_injector::run(args),
        Command::Operator(ref args) => operator::run(args, init_config(&cli)?).await,
        Command::ConfigSync(ref args) => config_sync::run(args, init_config(&cli)?).await,
        Command::Render(ref args) => render::run(args, init_config(&cli)?),
    }
}
