pub type CcmoResult<T = (), E = CcmoError> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum CcmoError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Invalid Json: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("Invalid Yaml: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },
}
