//! Deterministic output file names.
//!
//! Names are `<prefix>.<key><suffix>` and sort in the order they were handed
//! out, so a consumer can order files by name alone:
//!
//! - sequence keys are zero padded to a fixed width (`out.00000042`);
//! - timestamp keys are UTC, microsecond precision (`out.20261019T081500.123456`).
//!   Two opens in the same instant, or a clock that stepped backwards, reuse
//!   the previous stamp with a ten digit `_NNNNNNNNNN` disambiguator. `_`
//!   sorts after both `.` and end-of-string, so the disambiguated name always
//!   follows.
//!
//! A key that would outgrow its fixed width is refused with
//! [`SinkError::NamesExhausted`] instead of breaking the order.

use std::path::Path;

use chrono::{DateTime, Utc};
use pipesplit_core::{NamingScheme, OutputSpec};

use crate::error::{io_err, SinkError};

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";
const DISAMBIGUATOR_WIDTH: usize = 10;

#[derive(Debug, Clone)]
pub struct FileNamer {
    prefix: String,
    suffix: String,
    pending_suffix: Option<String>,
    scheme: NamingScheme,
    next_seq: u64,
    last_stamp: Option<String>,
    disambiguator: u32,
}

impl FileNamer {
    pub fn new(output: &OutputSpec) -> Self {
        Self {
            prefix: output.prefix.clone(),
            suffix: output.suffix.clone().unwrap_or_default(),
            pending_suffix: output.pending_suffix.clone(),
            scheme: output.naming,
            next_seq: 0,
            last_stamp: None,
            disambiguator: 0,
        }
    }

    /// Build a namer that continues after the newest file already present in
    /// `output.directory`, so a restarted run never reuses a name.
    pub fn resume(output: &OutputSpec) -> Result<Self, SinkError> {
        let mut namer = Self::new(output);
        let dir = &output.directory;
        let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            namer.observe(name);
        }
        Ok(namer)
    }

    /// Account for an existing file name so later names sort after it.
    fn observe(&mut self, file_name: &str) {
        let Some(key) = self.key_of(file_name, true) else {
            return;
        };
        match self.scheme {
            NamingScheme::Sequence { .. } => {
                if let Ok(seq) = key.parse::<u64>() {
                    self.next_seq = self.next_seq.max(seq.saturating_add(1));
                }
            }
            NamingScheme::Timestamp => {
                let (stamp, n) = split_disambiguator(key);
                let newer = match &self.last_stamp {
                    None => true,
                    Some(last) => {
                        stamp > last.as_str() || (stamp == last && n > self.disambiguator)
                    }
                };
                if newer {
                    self.last_stamp = Some(stamp.to_owned());
                    self.disambiguator = n;
                }
            }
        }
    }

    /// Hand out the next name. `now` is only used by timestamp naming.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<String, SinkError> {
        let key = match self.scheme {
            NamingScheme::Sequence { width } => {
                let seq = self.next_seq;
                if seq > sequence_limit(width) {
                    return Err(self.exhausted(format!(
                        "sequence {seq} does not fit in {width} digits"
                    )));
                }
                self.next_seq = seq + 1;
                format!("{seq:0width$}")
            }
            NamingScheme::Timestamp => {
                let stamp = now.format(TIMESTAMP_FORMAT).to_string();
                match self.last_stamp.clone() {
                    Some(last) if stamp.as_str() <= last.as_str() => {
                        let n = self.disambiguator.checked_add(1).ok_or_else(|| {
                            self.exhausted(format!("too many files share the stamp {last}"))
                        })?;
                        self.disambiguator = n;
                        format!("{last}_{n:0width$}", width = DISAMBIGUATOR_WIDTH)
                    }
                    _ => {
                        self.last_stamp = Some(stamp.clone());
                        self.disambiguator = 0;
                        stamp
                    }
                }
            }
        };
        Ok(format!("{}.{}{}", self.prefix, key, self.suffix))
    }

    fn exhausted(&self, reason: String) -> SinkError {
        SinkError::NamesExhausted {
            prefix: self.prefix.clone(),
            reason,
        }
    }

    /// Name used while the file is still being written.
    pub fn pending_name(&self, final_name: &str) -> String {
        match &self.pending_suffix {
            Some(pending) => format!("{final_name}{pending}"),
            None => final_name.to_owned(),
        }
    }

    /// True if `file_name` is a finalized output file of this run's prefix.
    pub fn is_finalized(&self, file_name: &str) -> bool {
        self.key_of(file_name, false).is_some()
    }

    /// Extract the key from `<prefix>.<key><suffix>[pending]`. Pending names
    /// only match when `allow_pending` is set.
    fn key_of<'a>(&self, file_name: &'a str, allow_pending: bool) -> Option<&'a str> {
        let mut rest = file_name.strip_prefix(&self.prefix)?.strip_prefix('.')?;
        if let Some(pending) = &self.pending_suffix {
            if let Some(stripped) = rest.strip_suffix(pending.as_str()) {
                if !allow_pending {
                    return None;
                }
                rest = stripped;
            }
        }
        let key = rest.strip_suffix(self.suffix.as_str())?;
        let valid = match self.scheme {
            NamingScheme::Sequence { .. } => {
                !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
            }
            NamingScheme::Timestamp => key.len() >= 15 && key.as_bytes()[8] == b'T',
        };
        valid.then_some(key)
    }
}

/// Largest sequence number that still fits in `width` digits.
fn sequence_limit(width: usize) -> u64 {
    u32::try_from(width)
        .ok()
        .and_then(|w| 10u64.checked_pow(w))
        .map_or(u64::MAX - 1, |p| p - 1)
}

fn split_disambiguator(key: &str) -> (&str, u32) {
    match key.rsplit_once('_') {
        Some((stamp, n)) => match n.parse() {
            Ok(n) => (stamp, n),
            Err(_) => (key, 0),
        },
        None => (key, 0),
    }
}

/// True if `path` already exists (either name of a pending/final pair).
pub(crate) fn taken(dir: &Path, names: &[&str]) -> bool {
    names.iter().any(|name| dir.join(name).exists())
}
