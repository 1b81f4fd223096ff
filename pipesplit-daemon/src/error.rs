use std::io;
use std::path::PathBuf;

use thiserror::Error;

use pipesplit_core::ConfigError;
use pipesplit_sink::SinkError;

/// Process exit codes, one per terminal failure class (sysexits values).
pub mod exit_code {
    pub const OK: u8 = 0;
    pub const SOFTWARE: u8 = 70;
    pub const NO_INPUT: u8 = 66;
    pub const CANT_CREATE: u8 = 73;
    pub const IO: u8 = 74;
    pub const TEMP_FAIL: u8 = 75;
    pub const CONFIG: u8 = 78;
}

/// Failures of the input origin.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The pipe or path could not be attached.
    #[error("source {name} unavailable: {source}")]
    Unavailable {
        name: String,
        #[source]
        source: io::Error,
    },

    /// I/O failure while the source was attached.
    #[error("read from {name} failed: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Error surface of the copy loop and its runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("output failed: {0}")]
    Sink(#[from] SinkError),

    #[error("gave up reattaching after {attempts} rapid failures; last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("another instance is running (pid {pid}, pid file {path})")]
    AlreadyRunning { pid: i32, path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// Exit code reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            EngineError::Config(_) => exit_code::CONFIG,
            EngineError::Source(SourceError::Unavailable { .. }) => exit_code::NO_INPUT,
            EngineError::Source(SourceError::Read { .. }) => exit_code::IO,
            EngineError::Sink(_) => exit_code::CANT_CREATE,
            EngineError::RetriesExhausted { .. } => exit_code::NO_INPUT,
            EngineError::AlreadyRunning { .. } => exit_code::TEMP_FAIL,
            EngineError::Io { .. } => exit_code::SOFTWARE,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_failure_classes() {
        let unavailable = EngineError::Source(SourceError::Unavailable {
            name: "fifo:/nope".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        let read = EngineError::Source(SourceError::Read {
            name: "stdin".into(),
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        });
        let sink = EngineError::Sink(SinkError::Closed);
        let config = EngineError::Config(ConfigError::Invalid("x".into()));

        let codes = [
            unavailable.exit_code(),
            read.exit_code(),
            sink.exit_code(),
            config.exit_code(),
        ];
        assert_eq!(codes, [66, 74, 73, 78]);
        assert!(codes.iter().all(|c| *c != exit_code::OK));
    }
}
