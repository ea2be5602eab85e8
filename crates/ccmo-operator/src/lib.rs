pub mod api;
pub mod cloud;
pub mod config;
pub mod constants;
pub mod error;
pub mod k8s;
pub mod operator;
pub mod render;
pub mod substitution;
pub mod watcher;

pub use operator::{run_config_sync, run_operator};

/// Short description of the build, e.g. `0.1.0 (3f2c1aa, 2024-05-02T10:11:12Z)`.
pub fn build_info() -> String {
    format!(
        "{} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_names_version_sha_and_timestamp() {
        let info = build_info();
        assert!(info.starts_with(concat!(env!("CARGO_PKG_VERSION"), " (")));
        assert!(info.ends_with(')'));
        assert_eq!(info.matches(", ").count(), 1);
    }
}
