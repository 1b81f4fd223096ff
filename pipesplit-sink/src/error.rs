//! Error types for pipesplit-sink.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the output destination. The copy loop treats all of them as
/// fatal for the destination.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Creating, renaming, syncing or listing output files failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A chunk could not be written, even after one retry.
    #[error("write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The next name would no longer sort after the previous one.
    #[error("no more output names for prefix '{prefix}': {reason}")]
    NamesExhausted { prefix: String, reason: String },

    /// The sink was already closed.
    #[error("no output file is open")]
    Closed,
}

/// Convenience constructor for [`SinkError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.into(),
        source,
    }
}
