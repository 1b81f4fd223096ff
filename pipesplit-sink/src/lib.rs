//! # pipesplit-sink
//!
//! Output side of the copy loop: the rotation decision ([`policy`]), file
//! naming ([`naming`]), the single-writer [`FileSink`] and count-based
//! [`retention`].

pub mod error;
pub mod naming;
pub mod policy;
pub mod retention;
pub mod sink;

pub use error::SinkError;
pub use naming::FileNamer;
pub use policy::{should_rotate, FileState, RotateReason};
pub use sink::{FileSink, RotatedFile};
