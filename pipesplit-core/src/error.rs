//! Error types for pipesplit-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the run configuration.
///
/// These are detected once at startup and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the file path for context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The assembled configuration is self-contradictory or out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub(crate) fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
