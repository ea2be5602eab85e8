use std::{fs, path::PathBuf};

use clap::Parser;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{CliError, CliResult};

const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";

const CLIENT_ID_KEY: &str = "aadClientId";
const CLIENT_SECRET_KEY: &str = "aadClientSecret";
const USE_MANAGED_IDENTITY_EXTENSION_KEY: &str = "useManagedIdentityExtension";

#[derive(Parser, Debug, Clone)]
pub struct InjectorArgs {
    /// Location of the original cloud config file.
    #[arg(long, default_value = "/tmp/cloud-config/cloud.conf")]
    pub cloud_config_file_path: PathBuf,

    /// Location of the generated cloud config file with injected credentials.
    #[arg(long, default_value = "/tmp/merged-cloud-config/cloud.conf")]
    pub output_file_path: PathBuf,

    /// Disable managed identity authentication, if it's set in the cloud config.
    #[arg(long)]
    pub disable_identity_extension_auth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    client_id: String,
    client_secret: String,
}

fn read_credentials(lookup: impl Fn(&str) -> Option<String>) -> CliResult<Credentials> {
    let required = |name: &str| {
        lookup(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CliError::Injector(format!("{name} env variable should be set up")))
    };
    Ok(Credentials {
        client_id: required(CLIENT_ID_ENV)?,
        client_secret: required(CLIENT_SECRET_ENV)?,
    })
}

fn prepare_cloud_config(
    mut cloud_config: Map<String, Value>,
    credentials: &Credentials,
    disable_identity_extension_auth: bool,
) -> Map<String, Value> {
    cloud_config.insert(CLIENT_ID_KEY.to_string(), credentials.client_id.clone().into());
    cloud_config.insert(CLIENT_SECRET_KEY.to_string(), credentials.client_secret.clone().into());

    if let Some(value) = cloud_config.get_mut(USE_MANAGED_IDENTITY_EXTENSION_KEY) {
        if disable_identity_extension_auth {
            info!("{USE_MANAGED_IDENTITY_EXTENSION_KEY} cleared");
            *value = Value::Bool(false);
        } else if *value == Value::Bool(true) {
            warn!("{USE_MANAGED_IDENTITY_EXTENSION_KEY} is set to \"true\", injected credentials may not be used");
        }
    }
    cloud_config
}

fn inject(args: &InjectorArgs, credentials: &Credentials) -> CliResult {
    let raw = fs::read_to_string(&args.cloud_config_file_path).map_err(|e| {
        CliError::Injector(format!(
            "couldn't read cloud config from file {}: {e}",
            args.cloud_config_file_path.display()
        ))
    })?;
    let cloud_config: Map<String, Value> = serde_json::from_str(&raw)
        .map_err(|e| CliError::Injector(format!("couldn't read cloud config from file: {e}")))?;

    let prepared = prepare_cloud_config(cloud_config, credentials, args.disable_identity_extension_auth);
    let output = serde_json::to_string(&prepared)
        .map_err(|e| CliError::Injector(format!("couldn't prepare cloud config: {e}")))?;

    fs::write(&args.output_file_path, output).map_err(|e| {
        CliError::Injector(format!("couldn't write prepared cloud config to file: {e}"))
    })?;
    info!(output = %args.output_file_path.display(), "Cloud config with credentials written");
    Ok(())
}

pub fn run(args: &InjectorArgs) -> CliResult {
    if !args.cloud_config_file_path.exists() {
        return Err(CliError::Injector(format!(
            "stat {}: no such file or directory",
            args.cloud_config_file_path.display()
        )));
    }
    let credentials = read_credentials(|name| std::env::var(name).ok())?;
    inject(args, &credentials)
}
