//! YAML config file layer and startup validation.
//!
//! # File format
//!
//! Every key is optional; anything omitted keeps its default (or the value a
//! command-line flag supplies later).
//!
//! ```yaml
//! input: /run/app/stream.fifo   # "-" for standard input
//! create_fifo: true
//! output:
//!   directory: /var/spool/app
//!   prefix: app
//!   suffix: .log
//!   naming: sequence            # or: timestamp
//!   width: 8
//!   pending_suffix: .part
//!   max_files: 48
//!   sync: false                 # default true
//! rotation:
//!   max_bytes: 10485760
//!   max_age: 1h
//! daemon:
//!   enabled: true
//!   continue_read: true
//!   backoff_initial: 1s
//!   backoff_max: 30s
//!   max_restarts: 10
//!   min_attach: 2s
//!   pid_file: /run/app/pipesplit.pid
//! write_error: abort            # or: discard
//! shutdown_grace: 5s
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{invalid, ConfigError};
use crate::types::{
    NamingScheme, RunConfig, SourceSpec, WriteErrorPolicy, DEFAULT_SEQUENCE_WIDTH,
    MAX_SEQUENCE_WIDTH,
};

// ---------------------------------------------------------------------------
// 1. File representation
// ---------------------------------------------------------------------------

/// Naming scheme selector as written in files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingKind {
    Sequence,
    Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub directory: Option<PathBuf>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub naming: Option<NamingKind>,
    pub width: Option<usize>,
    pub pending_suffix: Option<String>,
    pub max_files: Option<usize>,
    pub sync: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotationSection {
    pub max_bytes: Option<u64>,
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSection {
    pub enabled: Option<bool>,
    pub continue_read: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    pub backoff_initial: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub backoff_max: Option<Duration>,
    pub max_restarts: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub min_attach: Option<Duration>,
    pub pid_file: Option<PathBuf>,
}

/// Partial configuration read from a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub input: Option<String>,
    pub create_fifo: Option<bool>,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub rotation: RotationSection,
    #[serde(default)]
    pub daemon: DaemonSection,
    pub write_error: Option<WriteErrorPolicy>,
    #[serde(default, with = "humantime_serde")]
    pub shutdown_grace: Option<Duration>,
}

// ---------------------------------------------------------------------------
// 2. Loading
// ---------------------------------------------------------------------------

/// Read a YAML config file. An empty file is an empty configuration.
pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `-` means standard input; anything else is a named pipe path.
pub fn source_from_input(input: &str, create: bool) -> SourceSpec {
    if input == "-" {
        SourceSpec::Stdin
    } else {
        SourceSpec::Fifo {
            path: PathBuf::from(input),
            create,
        }
    }
}

/// Combine an optional scheme selector and width with the current scheme.
///
/// A width on its own only affects sequence naming.
pub fn resolve_naming(
    kind: Option<NamingKind>,
    width: Option<usize>,
    current: NamingScheme,
) -> NamingScheme {
    let current_width = match current {
        NamingScheme::Sequence { width } => width,
        NamingScheme::Timestamp => DEFAULT_SEQUENCE_WIDTH,
    };
    match (kind, current) {
        (Some(NamingKind::Timestamp), _) => NamingScheme::Timestamp,
        (Some(NamingKind::Sequence), _) | (None, NamingScheme::Sequence { .. }) => {
            NamingScheme::Sequence {
                width: width.unwrap_or(current_width),
            }
        }
        (None, NamingScheme::Timestamp) => NamingScheme::Timestamp,
    }
}

impl FileConfig {
    /// Overlay the values present in the file onto `base`.
    pub fn apply(self, mut base: RunConfig) -> RunConfig {
        if let Some(input) = self.input {
            base.source = source_from_input(&input, self.create_fifo.unwrap_or(false));
        } else if let (Some(create), SourceSpec::Fifo { create: c, .. }) =
            (self.create_fifo, &mut base.source)
        {
            *c = create;
        }

        let out = self.output;
        let output = &mut base.output;
        if let Some(directory) = out.directory {
            output.directory = directory;
        }
        if let Some(prefix) = out.prefix {
            output.prefix = prefix;
        }
        if out.suffix.is_some() {
            output.suffix = out.suffix;
        }
        output.naming = resolve_naming(out.naming, out.width, output.naming);
        if out.pending_suffix.is_some() {
            output.pending_suffix = out.pending_suffix;
        }
        if out.max_files.is_some() {
            output.max_files = out.max_files;
        }
        if let Some(sync) = out.sync {
            output.sync_on_rotate = sync;
        }

        if self.rotation.max_bytes.is_some() {
            base.trigger.max_bytes = self.rotation.max_bytes;
        }
        if self.rotation.max_age.is_some() {
            base.trigger.max_age = self.rotation.max_age;
        }

        let d = self.daemon;
        let daemon = &mut base.daemon;
        if let Some(enabled) = d.enabled {
            daemon.enabled = enabled;
        }
        if let Some(continue_read) = d.continue_read {
            daemon.continue_read = continue_read;
        }
        if let Some(initial) = d.backoff_initial {
            daemon.backoff.initial = initial;
        }
        if let Some(max) = d.backoff_max {
            daemon.backoff.max = max;
        }
        if d.max_restarts.is_some() {
            daemon.max_restarts = d.max_restarts;
        }
        if let Some(min_attach) = d.min_attach {
            daemon.min_attach = min_attach;
        }
        if d.pid_file.is_some() {
            daemon.pid_file = d.pid_file;
        }

        if let Some(policy) = self.write_error {
            base.write_error = policy;
        }
        if let Some(grace) = self.shutdown_grace {
            base.shutdown_grace = grace;
        }
        base
    }
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

impl RunConfig {
    /// Reject configurations the copy loop cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let output = &self.output;
        if output.prefix.is_empty() {
            return Err(invalid("output prefix must not be empty"));
        }
        if output.prefix.contains('/') {
            return Err(invalid(format!(
                "output prefix '{}' must not contain '/'; use the output directory instead",
                output.prefix
            )));
        }
        if let Some(suffix) = &output.suffix {
            if suffix.contains('/') {
                return Err(invalid(format!("suffix '{suffix}' must not contain '/'")));
            }
        }
        if let NamingScheme::Sequence { width } = output.naming {
            if width == 0 || width > MAX_SEQUENCE_WIDTH {
                return Err(invalid(format!(
                    "sequence width must be between 1 and {MAX_SEQUENCE_WIDTH}, got {width}"
                )));
            }
        }
        if let Some(pending) = &output.pending_suffix {
            if pending.is_empty() || pending.contains('/') {
                return Err(invalid(
                    "pending suffix must be non-empty and must not contain '/'",
                ));
            }
        }
        if output.max_files == Some(0) {
            return Err(invalid("max files must be at least 1"));
        }

        if self.trigger.max_bytes == Some(0) {
            return Err(invalid("max bytes must be greater than zero"));
        }
        if self.trigger.max_age == Some(Duration::ZERO) {
            return Err(invalid("max age must be greater than zero"));
        }

        let daemon = &self.daemon;
        if daemon.continue_read && !daemon.enabled {
            return Err(invalid("continue-read requires daemon mode"));
        }
        if self.write_error == WriteErrorPolicy::Discard && !daemon.enabled {
            return Err(invalid("discarding on write error requires daemon mode"));
        }
        if daemon.backoff.initial.is_zero() {
            return Err(invalid("initial backoff must be greater than zero"));
        }
        if daemon.backoff.initial > daemon.backoff.max {
            return Err(invalid(format!(
                "initial backoff {:?} exceeds maximum backoff {:?}",
                daemon.backoff.initial, daemon.backoff.max
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
