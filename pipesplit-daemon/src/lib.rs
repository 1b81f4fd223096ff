//! pipesplit runtime: source readers, the copy loop engine, the daemon
//! supervisor and the tokio runtime that ties them to process signals.

pub mod engine;
mod error;
pub mod runtime;
pub mod source;
pub mod supervisor;

pub use engine::{Engine, EngineState, RunSummary, SHUTDOWN_DRAIN};
pub use error::{exit_code, EngineError, SourceError};
pub use runtime::{run, start_blocking, LogFormat};
pub use source::{FifoSource, Source, SourceEvent, StdinSource, CHUNK_SIZE};
pub use supervisor::{PidFile, Supervisor};
