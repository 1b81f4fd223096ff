//! Source Reader: standard input or a named pipe, read in chunks.
//!
//! An attachment is the live handle to the origin. [`Source::close`] takes
//! it by value, so an old attachment is gone before the engine can ask for
//! a new one.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use nix::sys::stat::Mode;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::SourceError;

/// Bytes requested per read.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Result of one read on an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Chunk(Bytes),
    /// The producer closed its end (for a pipe: the last writer detached).
    EndOfStream,
}

#[allow(async_fn_in_trait)]
pub trait Source {
    type Attachment;

    /// Human-readable origin, used in logs and errors.
    fn name(&self) -> String;

    /// Whether a new attachment can follow end-of-stream.
    fn reattachable(&self) -> bool;

    /// Attach to the origin. For a pipe this suspends until a writer appears.
    async fn open(&mut self) -> Result<Self::Attachment, SourceError>;

    async fn read(&mut self, attachment: &mut Self::Attachment) -> Result<SourceEvent, SourceError>;

    async fn close(&mut self, attachment: Self::Attachment);
}

async fn read_chunk<R>(reader: &mut R, name: impl FnOnce() -> String) -> Result<SourceEvent, SourceError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => return Ok(SourceEvent::EndOfStream),
            Ok(_) => return Ok(SourceEvent::Chunk(buf.freeze())),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(SourceError::Read {
                    name: name(),
                    source,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Standard input
// ---------------------------------------------------------------------------

/// Standard input. At most one attachment per process.
#[derive(Debug, Default)]
pub struct StdinSource {
    attached: bool,
}

impl StdinSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Source for StdinSource {
    type Attachment = tokio::io::Stdin;

    fn name(&self) -> String {
        "stdin".to_owned()
    }

    fn reattachable(&self) -> bool {
        false
    }

    async fn open(&mut self) -> Result<Self::Attachment, SourceError> {
        if self.attached {
            return Err(SourceError::Unavailable {
                name: self.name(),
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "standard input was already consumed",
                ),
            });
        }
        self.attached = true;
        Ok(tokio::io::stdin())
    }

    async fn read(&mut self, attachment: &mut Self::Attachment) -> Result<SourceEvent, SourceError> {
        read_chunk(attachment, || self.name()).await
    }

    async fn close(&mut self, attachment: Self::Attachment) {
        drop(attachment);
    }
}

// ---------------------------------------------------------------------------
// Named pipe
// ---------------------------------------------------------------------------

/// A named pipe at a fixed path. Each attachment is one blocking open.
#[derive(Debug, Clone)]
pub struct FifoSource {
    path: PathBuf,
    create: bool,
}

impl FifoSource {
    pub fn new(path: impl Into<PathBuf>, create: bool) -> Self {
        Self {
            path: path.into(),
            create,
        }
    }

    fn unavailable(&self, source: io::Error) -> SourceError {
        SourceError::Unavailable {
            name: self.name(),
            source,
        }
    }

    fn ensure_fifo(&self) -> Result<(), SourceError> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.file_type().is_fifo() => Ok(()),
            Ok(_) => Err(self.unavailable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path exists but is not a named pipe",
            ))),
            Err(err) if err.kind() == io::ErrorKind::NotFound && self.create => {
                nix::unistd::mkfifo(&self.path, Mode::S_IRUSR | Mode::S_IWUSR)
                    .map_err(|errno| self.unavailable(io::Error::from(errno)))?;
                tracing::info!(path = %self.path.display(), "created named pipe");
                Ok(())
            }
            Err(err) => Err(self.unavailable(err)),
        }
    }
}

impl Source for FifoSource {
    type Attachment = tokio::fs::File;

    fn name(&self) -> String {
        format!("fifo:{}", self.path.display())
    }

    fn reattachable(&self) -> bool {
        true
    }

    async fn open(&mut self) -> Result<Self::Attachment, SourceError> {
        self.ensure_fifo()?;
        tracing::debug!(path = %self.path.display(), "waiting for a writer");
        tokio::fs::File::open(&self.path)
            .await
            .map_err(|err| self.unavailable(err))
    }

    async fn read(&mut self, attachment: &mut Self::Attachment) -> Result<SourceEvent, SourceError> {
        read_chunk(attachment, || self.name()).await
    }

    async fn close(&mut self, attachment: Self::Attachment) {
        drop(attachment);
        tracing::debug!(path = %self.path.display(), "pipe attachment closed");
    }
}
