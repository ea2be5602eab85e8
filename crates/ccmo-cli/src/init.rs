use ccmo_common::settings::{get_config, Settings, CONFIG_INSTANCE};

use crate::{
    error::{CliError, CliResult},
    cli::Cli,
};

/// Loads settings once per process. An explicit settings file wins over `--root`.
pub fn init_config(cli: &Cli) -> CliResult<&'static Settings> {
    let root = cli.settings.clone().or_else(|| cli.root.clone());
    let settings = Settings::from_root(root)?;
    CONFIG_INSTANCE
        .set(settings)
        .map_err(|_| CliError::InitConfig("config already initialized".to_string()))?;
    Ok(get_config()?)
}
