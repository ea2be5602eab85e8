mod cli;
mod error;
mod init;

pub use cli::exec;
pub use error::{CliError, CliResult};
