use ccmo_common::error::CcmoError;
use ccmo_operator::error::OperatorError;
use thiserror::Error;

pub type CliResult<T = (), E = CliError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Unable to initialize config: {0}")]
    InitConfig(String),
    #[error("Unable to run command: {0}")]
    Command(#[from] clap::error::Error),
    #[error("{0}")]
    Injector(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<CcmoError> for CliError {
    fn from(error: CcmoError) -> Self {
        CliError::InitConfig(error.to_string())
    }
}

impl From<OperatorError> for CliError {
    fn from(error: OperatorError) -> Self {
        CliError::Runtime(error.to_string())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        CliError::Runtime(error.to_string())
    }
}
