//! Run configuration types.
//!
//! A [`RunConfig`] is assembled once at startup (defaults, then the optional
//! YAML file, then command-line flags) and is never mutated by the copy loop.
//! Durations serialize in humantime form (`"30s"`, `"1h 5m"`).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_PREFIX: &str = "out";
pub const DEFAULT_SEQUENCE_WIDTH: usize = 8;
pub const MAX_SEQUENCE_WIDTH: usize = 20;
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);
pub const DEFAULT_MIN_ATTACH: Duration = Duration::from_secs(1);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where the byte stream comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    /// The process's standard input. Attached once for the whole run.
    #[default]
    Stdin,
    /// A named pipe. Re-attachable in daemon mode.
    Fifo {
        path: PathBuf,
        /// Create the pipe if it does not exist yet.
        #[serde(default)]
        create: bool,
    },
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Stdin => f.write_str("stdin"),
            SourceSpec::Fifo { path, .. } => write!(f, "fifo:{}", path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// How output file names are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum NamingScheme {
    /// `<prefix>.<zero-padded sequence>`
    Sequence { width: usize },
    /// `<prefix>.<UTC timestamp captured at open>`
    Timestamp,
}

impl Default for NamingScheme {
    fn default() -> Self {
        NamingScheme::Sequence {
            width: DEFAULT_SEQUENCE_WIDTH,
        }
    }
}

/// Output directory and file naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub directory: PathBuf,
    pub prefix: String,
    /// Appended after the key, e.g. `.log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default)]
    pub naming: NamingScheme,
    /// While a file is open it is named `<final><pending_suffix>` and only
    /// renamed to its final name once flushed and closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_suffix: Option<String>,
    /// Keep at most this many finalized files; older ones are deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    /// `fsync` each file before it is closed. On by default.
    #[serde(default)]
    pub sync_on_rotate: bool,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            prefix: DEFAULT_PREFIX.to_owned(),
            suffix: None,
            naming: NamingScheme::default(),
            pending_suffix: None,
            max_files: None,
            sync_on_rotate: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Condition that forces a new output file. Whichever limit fires first wins;
/// with neither set the run writes a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RotationTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_age: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Capped exponential backoff between reattach attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: DEFAULT_BACKOFF_INITIAL,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Long-lived operation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSpec {
    pub enabled: bool,
    /// Reattach to the pipe after its writer goes away.
    pub continue_read: bool,
    pub backoff: Backoff,
    /// Give up after this many consecutive rapid failures. `None` retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
    /// An attachment shorter than this counts as a rapid failure.
    #[serde(with = "humantime_serde")]
    pub min_attach: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,
}

impl Default for DaemonSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            continue_read: false,
            backoff: Backoff::default(),
            max_restarts: None,
            min_attach: DEFAULT_MIN_ATTACH,
            pid_file: None,
        }
    }
}

/// What to do when the output destination fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteErrorPolicy {
    /// Stop the run with a write-failure exit code.
    #[default]
    Abort,
    /// Keep draining the source and drop chunks (daemon mode only).
    Discard,
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Complete, immutable configuration for one process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub source: SourceSpec,
    pub output: OutputSpec,
    pub trigger: RotationTrigger,
    pub daemon: DaemonSpec,
    pub write_error: WriteErrorPolicy,
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: SourceSpec::default(),
            output: OutputSpec::default(),
            trigger: RotationTrigger::default(),
            daemon: DaemonSpec::default(),
            write_error: WriteErrorPolicy::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}
