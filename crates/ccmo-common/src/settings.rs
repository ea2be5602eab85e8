use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::Context;
use config::{Environment, File};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{CcmoError, CcmoResult};

pub static CONFIG_INSTANCE: OnceLock<Settings> = OnceLock::new();

pub const DEFAULT_MANAGED_NAMESPACE: &str = "openshift-cloud-controller-manager";
pub const DEFAULT_IMAGES_FILE: &str = "/etc/cloud-controller-manager-config/images.json";
pub const RELEASE_VERSION_ENV: &str = "RELEASE_VERSION";
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LeaderElectionArgs {
    #[serde(default)]
    pub enabled: bool,

    /// Namespace holding the lease. Falls back to the operator namespace.
    #[serde(default = "default_leader_namespace")]
    pub namespace: String,

    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,

    #[serde(default = "default_renew_deadline_secs")]
    pub renew_deadline_secs: u64,

    #[serde(default = "default_retry_period_secs")]
    pub retry_period_secs: u64,
}

impl Default for LeaderElectionArgs {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: default_leader_namespace(),
            lease_duration_secs: default_lease_duration_secs(),
            renew_deadline_secs: default_renew_deadline_secs(),
            retry_period_secs: default_retry_period_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,

    #[serde(default = "default_managed_namespace")]
    pub managed_namespace: String,

    #[serde(default = "default_images_file")]
    pub images_file: PathBuf,

    #[serde(default = "default_release_version")]
    pub release_version: String,

    /// Override for the system trust bundle read by the trusted CA controller.
    #[serde(default)]
    pub trust_bundle_path: Option<PathBuf>,

    #[serde(default = "LeaderElectionArgs::default")]
    pub leader_election: LeaderElectionArgs,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            managed_namespace: default_managed_namespace(),
            images_file: default_images_file(),
            release_version: default_release_version(),
            trust_bundle_path: None,
            leader_election: LeaderElectionArgs::default(),
        }
    }
}

pub fn get_config() -> CcmoResult<&'static Settings> {
    CONFIG_INSTANCE
        .get()
        .ok_or_else(|| CcmoError::Runtime(anyhow::anyhow!("Config not initialized")))
}

impl Settings {
    /// Layers, lowest precedence first: `root` itself when it is a file, `config`,
    /// `config/default`, `config.{RUN_MODE}`, `{root}/config`, then `CCMO_*` env vars.
    pub fn from_root(root: Option<PathBuf>) -> CcmoResult<Self> {
        let curr_dir = env::current_dir().context("unable to get working directory")?;
        let root = root.unwrap_or(curr_dir);
        if !root.exists() {
            return Err(CcmoError::FileNotFound(root.display().to_string()));
        }
        let root = root
            .canonicalize()
            .context("unable to canonicalize root directory")?;

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut s = config::Config::builder();
        if root.is_file() {
            s = s.add_source(File::from(root.as_path()));
        }
        let s = s
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(File::from(config_dir(&root)).required(false))
            .add_source(
                Environment::with_prefix("CCMO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg = s.try_deserialize()?;
        Ok(cfg)
    }
}

fn config_dir(root: &Path) -> PathBuf {
    if root.is_file() {
        root.parent().unwrap_or(root).join("config")
    } else {
        root.join("config")
    }
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn default_managed_namespace() -> String {
    DEFAULT_MANAGED_NAMESPACE.to_string()
}

fn default_images_file() -> PathBuf {
    PathBuf::from(DEFAULT_IMAGES_FILE)
}

fn default_release_version() -> String {
    env::var(RELEASE_VERSION_ENV).unwrap_or_else(|_| UNKNOWN_VERSION.to_string())
}

fn default_leader_namespace() -> String {
    "openshift-cloud-controller-manager-operator".to_string()
}

fn default_lease_duration_secs() -> u64 {
    137
}

fn default_renew_deadline_secs() -> u64 {
    107
}

fn default_retry_period_secs() -> u64 {
    26
}
