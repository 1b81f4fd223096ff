//! Copy Loop: source → rotation policy → file sink.
//!
//! ```text
//!            ┌──────── EOF / read error (daemon, reattachable) ───────┐
//!            ▼                                                         │
//!  ──▶ Attaching ──open──▶ Reading ◀──▶ Rotating                       │
//!            │                │ └──────────────────────────────────────┘
//!            │                │ EOF / shutdown / fatal error
//!            └────────────────┴──▶ Draining ──▶ Stopped
//! ```
//!
//! Shutdown is observed between operations only: a chunk that has been read
//! is always written (or rejected) whole before the signal is looked at.
//! A read cut short by shutdown may already have taken bytes off the pipe,
//! so the source is read for up to [`SHUTDOWN_DRAIN`] more before it is
//! closed.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use pipesplit_core::{RunConfig, WriteErrorPolicy};
use pipesplit_sink::{should_rotate, FileSink, SinkError};

use crate::error::{EngineError, SourceError};
use crate::source::{Source, SourceEvent};
use crate::supervisor::Supervisor;

/// How long the source keeps being read after shutdown was requested.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Attaching,
    Reading,
    Rotating,
    Draining,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Attaching => "attaching",
            EngineState::Reading => "reading",
            EngineState::Rotating => "rotating",
            EngineState::Draining => "draining",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters reported when the engine stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Output files opened during the run, including the last one.
    pub files: u64,
    pub bytes: u64,
    pub chunks: u64,
    pub attachments: u64,
    pub rotations: u64,
    /// Bytes dropped after the output failed under the discard policy.
    pub discarded_bytes: u64,
}

/// Why an attachment ended.
enum Detach {
    EndOfStream,
    Shutdown,
    ReadFailed(SourceError),
}

pub struct Engine<S: Source> {
    config: RunConfig,
    source: S,
    sink: Option<FileSink>,
    supervisor: Supervisor,
    state: EngineState,
    summary: RunSummary,
}

impl<S: Source> Engine<S> {
    pub fn new(config: RunConfig, source: S, sink: FileSink) -> Self {
        let supervisor = Supervisor::new(&config.daemon);
        Self {
            config,
            source,
            sink: Some(sink),
            supervisor,
            state: EngineState::Attaching,
            summary: RunSummary::default(),
        }
    }

    /// Run until end-of-stream, shutdown or a fatal error. The output file is
    /// closed and the attachment released on every path.
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<RunSummary, EngineError> {
        let outcome = self.copy(&mut shutdown).await;
        self.transition(EngineState::Draining);
        let drained = self.drain();
        self.transition(EngineState::Stopped);
        match (outcome, drained) {
            (Err(err), _) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => {
                tracing::info!(
                    files = self.summary.files,
                    bytes = self.summary.bytes,
                    rotations = self.summary.rotations,
                    attachments = self.summary.attachments,
                    "copy finished"
                );
                Ok(self.summary)
            }
        }
    }

    async fn copy(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), EngineError> {
        let daemon = self.config.daemon.enabled;
        let continue_read = self.config.daemon.continue_read;

        loop {
            self.transition(EngineState::Attaching);
            let opened = tokio::select! {
                biased;
                _ = shutdown.recv() => return Ok(()),
                opened = self.source.open() => opened,
            };
            let mut attachment = match opened {
                Ok(attachment) => attachment,
                Err(err) if daemon && self.source.reattachable() => {
                    let delay = self.supervisor.after_open_failure(&err)?;
                    tracing::warn!(
                        error = %err,
                        failures = self.supervisor.failures(),
                        retry_in = ?delay,
                        "source unavailable, retrying"
                    );
                    if sleep_or_shutdown(delay, shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            self.summary.attachments += 1;
            let attached_at = Instant::now();
            tracing::info!(
                source = %self.source.name(),
                attachment = self.summary.attachments,
                "source attached"
            );

            self.transition(EngineState::Reading);
            let detach = self.pump(&mut attachment, shutdown).await;
            self.source.close(attachment).await;

            let delay = match detach? {
                Detach::Shutdown => return Ok(()),
                Detach::EndOfStream => {
                    if !(daemon && continue_read && self.source.reattachable()) {
                        tracing::info!(source = %self.source.name(), "end of stream");
                        return Ok(());
                    }
                    let delay = self
                        .supervisor
                        .after_detach(attached_at.elapsed(), &"writer detached")?;
                    tracing::info!(
                        source = %self.source.name(),
                        reattach_in = ?delay,
                        "writer detached, reattaching"
                    );
                    delay
                }
                Detach::ReadFailed(err) => {
                    if !(daemon && self.source.reattachable()) {
                        return Err(err.into());
                    }
                    let delay = self.supervisor.after_detach(attached_at.elapsed(), &err)?;
                    tracing::warn!(error = %err, reattach_in = ?delay, "read failed, reattaching");
                    delay
                }
            };
            if sleep_or_shutdown(delay, shutdown).await {
                return Ok(());
            }
        }
    }

    async fn pump(
        &mut self,
        attachment: &mut S::Attachment,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Detach, EngineError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.recv() => None,
                event = self.source.read(attachment) => Some(event),
            };
            let Some(event) = event else {
                self.drain_source(attachment).await?;
                return Ok(Detach::Shutdown);
            };
            match event {
                Ok(SourceEvent::Chunk(chunk)) => self.deliver(&chunk)?,
                Ok(SourceEvent::EndOfStream) => return Ok(Detach::EndOfStream),
                Err(err) => return Ok(Detach::ReadFailed(err)),
            }
        }
    }

    /// Deliver whatever the source already has in hand, until it runs dry or
    /// [`SHUTDOWN_DRAIN`] has passed.
    async fn drain_source(&mut self, attachment: &mut S::Attachment) -> Result<(), EngineError> {
        let deadline = Instant::now() + SHUTDOWN_DRAIN;
        loop {
            match tokio::time::timeout_at(deadline, self.source.read(attachment)).await {
                Ok(Ok(SourceEvent::Chunk(chunk))) => self.deliver(&chunk)?,
                Ok(Ok(SourceEvent::EndOfStream)) | Err(_) => return Ok(()),
                Ok(Err(err)) => {
                    tracing::debug!(error = %err, "read after shutdown failed");
                    return Ok(());
                }
            }
        }
    }

    /// Rotate if the policy says so, then write the chunk whole.
    fn deliver(&mut self, chunk: &[u8]) -> Result<(), EngineError> {
        self.summary.chunks += 1;
        let len = chunk.len() as u64;

        let reason = match &self.sink {
            None => {
                self.summary.discarded_bytes += len;
                return Ok(());
            }
            Some(sink) => sink.state().and_then(|state| {
                should_rotate(&self.config.trigger, &state, chunk.len(), Instant::now())
            }),
        };

        if let Some(reason) = reason {
            self.transition(EngineState::Rotating);
            let rotated = self.sink.as_mut().map(FileSink::rotate);
            self.transition(EngineState::Reading);
            match rotated {
                Some(Ok(file)) => {
                    self.summary.rotations += 1;
                    tracing::info!(
                        reason = %reason,
                        path = %file.path.display(),
                        bytes = file.bytes,
                        "rotated"
                    );
                }
                Some(Err(err)) => return self.sink_failed(err, len),
                None => {}
            }
        }

        let Some(sink) = self.sink.as_mut() else {
            self.summary.discarded_bytes += len;
            return Ok(());
        };
        match sink.write(chunk) {
            Ok(()) => {
                self.summary.bytes += len;
                Ok(())
            }
            Err(err) => self.sink_failed(err, len),
        }
    }

    fn sink_failed(&mut self, err: SinkError, len: u64) -> Result<(), EngineError> {
        match self.config.write_error {
            WriteErrorPolicy::Abort => Err(err.into()),
            WriteErrorPolicy::Discard => {
                tracing::error!(error = %err, "output failed, discarding input from now on");
                if let Some(mut sink) = self.sink.take() {
                    self.summary.files = sink.files_opened();
                    if let Err(close_err) = sink.close() {
                        tracing::warn!(error = %close_err, "failed to close output after error");
                    }
                }
                self.summary.discarded_bytes += len;
                Ok(())
            }
        }
    }

    fn drain(&mut self) -> Result<(), EngineError> {
        if let Some(mut sink) = self.sink.take() {
            self.summary.files = sink.files_opened();
            sink.close()?;
        }
        Ok(())
    }

    fn transition(&mut self, next: EngineState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "engine state");
            self.state = next;
        }
    }
}

/// Wait for `delay`; true if shutdown was requested meanwhile.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
