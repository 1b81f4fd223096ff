//! Daemon Supervisor: reattach backoff and the pid file lifecycle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use pipesplit_core::DaemonSpec;

use crate::error::{io_err, EngineError};

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Retry policy for reattaching to the source.
///
/// An attachment that lasted at least `min_attach` is healthy: it resets the
/// backoff and the reattach happens at once. Shorter attachments and failed
/// opens are rapid failures; each waits twice as long as the previous one,
/// capped at `backoff.max`, and more than `max_restarts` consecutive rapid
/// failures give up.
#[derive(Debug, Clone)]
pub struct Supervisor {
    initial: Duration,
    max: Duration,
    max_restarts: Option<u32>,
    min_attach: Duration,
    next_delay: Duration,
    failures: u32,
}

impl Supervisor {
    pub fn new(spec: &DaemonSpec) -> Self {
        Self {
            initial: spec.backoff.initial,
            max: spec.backoff.max,
            max_restarts: spec.max_restarts,
            min_attach: spec.min_attach,
            next_delay: spec.backoff.initial,
            failures: 0,
        }
    }

    /// Consecutive rapid failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay before reattaching after an attachment of `attached_for` ended.
    pub fn after_detach(
        &mut self,
        attached_for: Duration,
        reason: &dyn std::fmt::Display,
    ) -> Result<Duration, EngineError> {
        if attached_for >= self.min_attach {
            self.reset();
            return Ok(Duration::ZERO);
        }
        self.record_failure(reason)
    }

    /// Delay before retrying after `open` failed.
    pub fn after_open_failure(
        &mut self,
        reason: &dyn std::fmt::Display,
    ) -> Result<Duration, EngineError> {
        self.record_failure(reason)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_delay = self.initial;
    }

    fn record_failure(&mut self, reason: &dyn std::fmt::Display) -> Result<Duration, EngineError> {
        self.failures = self.failures.saturating_add(1);
        if let Some(limit) = self.max_restarts {
            if self.failures > limit {
                return Err(EngineError::RetriesExhausted {
                    attempts: self.failures,
                    last: reason.to_string(),
                });
            }
        }
        let delay = self.next_delay;
        self.next_delay = self.next_delay.saturating_mul(2).min(self.max);
        Ok(delay)
    }
}

// ---------------------------------------------------------------------------
// Pid file
// ---------------------------------------------------------------------------

/// Pid file written at startup and removed when dropped at `Stopped`.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write this process's pid to `path`.
    ///
    /// A pid file naming a live process is refused; a stale one is replaced.
    pub fn create(path: &Path) -> Result<Self, EngineError> {
        match fs::read_to_string(path) {
            Ok(existing) => {
                if let Ok(pid) = existing.trim().parse::<i32>() {
                    let alive = pid > 0
                        && pid != std::process::id() as i32
                        && kill(Pid::from_raw(pid), None).is_ok();
                    if alive {
                        return Err(EngineError::AlreadyRunning {
                            pid,
                            path: path.to_path_buf(),
                        });
                    }
                }
                tracing::warn!(path = %path.display(), "replacing stale pid file");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(path, err)),
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(path, format!("{}\n", std::process::id())).map_err(|e| io_err(path, e))?;
        tracing::debug!(path = %path.display(), "pid file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove pid file");
            }
        }
    }
}
