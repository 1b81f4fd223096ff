//! pipesplit core library: run configuration types, config file loading and
//! startup validation.
//!
//! - [`types`]: [`RunConfig`] and its parts
//! - [`config`]: YAML file layer and [`RunConfig::validate`]
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::FileConfig;
pub use error::ConfigError;
pub use types::{
    Backoff, DaemonSpec, NamingScheme, OutputSpec, RotationTrigger, RunConfig, SourceSpec,
    WriteErrorPolicy,
};
