//! Rotation decision.
//!
//! Evaluated only when a chunk arrives; an idle stream never rotates on its
//! own. A chunk is never split: when a single chunk is larger than
//! `max_bytes` it lands whole in a fresh file, which therefore overshoots
//! the limit, and the next chunk rotates again.

use std::fmt;

use pipesplit_core::RotationTrigger;
use tokio::time::Instant;

/// Position of the currently open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    /// Bytes written since the file was opened. Never decreases.
    pub bytes_written: u64,
    pub opened_at: Instant,
}

impl FileState {
    pub fn fresh(opened_at: Instant) -> Self {
        Self {
            bytes_written: 0,
            opened_at,
        }
    }
}

/// Which limit forced a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateReason {
    Size,
    Age,
}

impl fmt::Display for RotateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotateReason::Size => f.write_str("size"),
            RotateReason::Age => f.write_str("age"),
        }
    }
}

/// Decide whether the next chunk of `next_len` bytes must start a new file.
///
/// An empty file is never rotated away.
pub fn should_rotate(
    trigger: &RotationTrigger,
    state: &FileState,
    next_len: usize,
    now: Instant,
) -> Option<RotateReason> {
    if state.bytes_written == 0 {
        return None;
    }
    if let Some(max_bytes) = trigger.max_bytes {
        if state.bytes_written.saturating_add(next_len as u64) > max_bytes {
            return Some(RotateReason::Size);
        }
    }
    if let Some(max_age) = trigger.max_age {
        if now.saturating_duration_since(state.opened_at) >= max_age {
            return Some(RotateReason::Age);
        }
    }
    None
}
