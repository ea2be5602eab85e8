pub mod error;
pub mod settings;
pub mod util;

// Re-exports
pub use ::tracing::{self, debug, error, info, instrument, metadata, trace, warn};
pub use util::*;
