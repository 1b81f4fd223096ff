//! File Sink Manager: owns the one open output file.
//!
//! ## Rotation protocol
//!
//! 1. Flush the current file (and `fsync` it when `sync_on_rotate` is set).
//! 2. Close it.
//! 3. Rename `<name><pending_suffix>` to `<name>` when a pending suffix is used.
//! 4. Prune finalized files beyond `max_files`.
//! 5. Create the next file with `create_new`, skipping any name already on disk.
//!
//! A file is therefore complete on disk before its successor exists.
//!
//! Chunks are all-or-nothing: if a chunk cannot be written whole, the bytes
//! that did land are cut off again, so every file holds whole chunks only.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use pipesplit_core::OutputSpec;
use tokio::time::Instant;

use crate::error::{io_err, SinkError};
use crate::naming::{self, FileNamer};
use crate::policy::FileState;
use crate::retention;

/// Upper bound on names skipped because they already exist.
const MAX_NAME_ATTEMPTS: usize = 1024;

/// A file that has been closed and handed over to the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug)]
struct OpenFile {
    file: File,
    final_path: PathBuf,
    write_path: PathBuf,
    state: FileState,
}

#[derive(Debug)]
pub struct FileSink {
    output: OutputSpec,
    namer: FileNamer,
    current: Option<OpenFile>,
    files_opened: u64,
}

impl FileSink {
    /// Create the output directory if needed and open the first file.
    pub fn open(output: &OutputSpec) -> Result<Self, SinkError> {
        std::fs::create_dir_all(&output.directory).map_err(|e| io_err(&output.directory, e))?;
        let namer = FileNamer::resume(output)?;
        let mut sink = Self {
            output: output.clone(),
            namer,
            current: None,
            files_opened: 0,
        };
        sink.open_next()?;
        Ok(sink)
    }

    /// Final path of the file currently receiving writes.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_ref().map(|f| f.final_path.as_path())
    }

    /// Stream position of the open file.
    pub fn state(&self) -> Option<FileState> {
        self.current.as_ref().map(|f| f.state)
    }

    pub fn files_opened(&self) -> u64 {
        self.files_opened
    }

    /// Finalize the open file and start the next one.
    pub fn rotate(&mut self) -> Result<RotatedFile, SinkError> {
        let rotated = self.finalize()?.ok_or(SinkError::Closed)?;
        self.open_next()?;
        Ok(rotated)
    }

    /// Write a whole chunk. A failed write resumes once from where it
    /// stopped; a second failure is fatal and leaves the file as it was
    /// before the chunk.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        let open = self.current.as_mut().ok_or(SinkError::Closed)?;
        let start = open.state.bytes_written;
        write_chunk(&mut open.file, start, chunk, &open.write_path).map_err(|source| {
            SinkError::Write {
                path: open.write_path.clone(),
                source,
            }
        })?;
        open.state.bytes_written = start + chunk.len() as u64;
        Ok(())
    }

    /// Flush and close the open file. Idempotent.
    pub fn close(&mut self) -> Result<Option<RotatedFile>, SinkError> {
        self.finalize()
    }

    fn finalize(&mut self) -> Result<Option<RotatedFile>, SinkError> {
        let Some(mut open) = self.current.take() else {
            return Ok(None);
        };
        open.file
            .flush()
            .map_err(|e| io_err(&open.write_path, e))?;
        if self.output.sync_on_rotate {
            open.file
                .sync_all()
                .map_err(|e| io_err(&open.write_path, e))?;
        }
        drop(open.file);

        if open.write_path != open.final_path {
            std::fs::rename(&open.write_path, &open.final_path)
                .map_err(|e| io_err(&open.final_path, e))?;
        }

        tracing::info!(
            path = %open.final_path.display(),
            bytes = open.state.bytes_written,
            "output file finalized"
        );

        if let Some(keep) = self.output.max_files {
            retention::prune(&self.output.directory, &self.namer, keep);
        }

        Ok(Some(RotatedFile {
            path: open.final_path,
            bytes: open.state.bytes_written,
        }))
    }

    fn open_next(&mut self) -> Result<(), SinkError> {
        let dir = self.output.directory.clone();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let final_name = self.namer.next(Utc::now())?;
            let write_name = self.namer.pending_name(&final_name);
            if naming::taken(&dir, &[&final_name, &write_name]) {
                tracing::debug!(name = %final_name, "output name already in use, skipping");
                continue;
            }
            let write_path = dir.join(&write_name);
            let file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&write_path)
            {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(name = %write_name, "output name raced, skipping");
                    continue;
                }
                Err(err) => return Err(io_err(&write_path, err)),
            };
            tracing::debug!(path = %write_path.display(), "output file opened");
            self.current = Some(OpenFile {
                file,
                final_path: dir.join(&final_name),
                write_path,
                state: FileState::fresh(Instant::now()),
            });
            self.files_opened += 1;
            return Ok(());
        }
        Err(io_err(
            &dir,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "could not find an unused output file name",
            ),
        ))
    }
}

/// An output that can drop everything past `len` and carry on writing there.
trait Truncate: Write {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len)).map(|_| ())
    }
}

/// Write `chunk` at offset `start` of `out`, resuming once after an error.
/// On failure the partial chunk is truncated away.
fn write_chunk<W: Truncate>(
    out: &mut W,
    start: u64,
    chunk: &[u8],
    path: &Path,
) -> io::Result<()> {
    let mut written = 0usize;
    let mut retried = false;
    let err = loop {
        if written == chunk.len() {
            return Ok(());
        }
        match out.write(&chunk[written..]) {
            Ok(0) if retried => break io::Error::from(io::ErrorKind::WriteZero),
            Ok(0) => retried = true,
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) if !retried => {
                tracing::warn!(
                    path = %path.display(),
                    written,
                    remaining = chunk.len() - written,
                    error = %err,
                    "chunk write failed, retrying once"
                );
                retried = true;
            }
            Err(err) => break err,
        }
    };
    if written > 0 {
        if let Err(undo) = out.truncate(start) {
            tracing::error!(
                path = %path.display(),
                written,
                error = %undo,
                "could not remove partial chunk"
            );
        }
    }
    Err(err)
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.current.is_some() {
            if let Err(err) = self.finalize() {
                tracing::warn!(error = %err, "failed to finalize output file on drop");
            }
        }
    }
}
