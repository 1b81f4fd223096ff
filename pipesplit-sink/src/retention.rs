//! Count-based retention for finalized output files.
//!
//! After each rotation the oldest finalized files of the run's prefix are
//! deleted until at most `keep` remain. Name order is age order (see
//! [`crate::naming`]). Files still carrying the pending suffix and files of
//! other prefixes are never touched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::naming::FileNamer;

/// Delete the oldest finalized files in `dir` beyond `keep`.
///
/// Errors are logged as warnings; retention never stops the copy loop.
/// Returns the paths that were removed.
pub fn prune(dir: &Path, namer: &FileNamer, keep: usize) -> Vec<PathBuf> {
    match prune_checked(dir, namer, keep) {
        Ok(removed) => removed,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "retention scan failed");
            Vec::new()
        }
    }
}

fn prune_checked(dir: &Path, namer: &FileNamer, keep: usize) -> io::Result<Vec<PathBuf>> {
    let mut finalized: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| namer.is_finalized(name))
        .collect();

    if finalized.len() <= keep {
        return Ok(Vec::new());
    }

    finalized.sort();
    let excess = finalized.len() - keep;
    let mut removed = Vec::with_capacity(excess);
    for name in finalized.into_iter().take(excess) {
        let path = dir.join(&name);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "old output file removed");
                removed.push(path);
            }
            // A consumer may have already moved it away.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove old output file")
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesplit_core::{NamingScheme, OutputSpec};
    use tempfile::TempDir;

    fn namer() -> FileNamer {
        FileNamer::new(&OutputSpec {
            prefix: "out".into(),
            suffix: Some(".log".into()),
            pending_suffix: Some(".part".into()),
            naming: NamingScheme::Sequence { width: 3 },
            ..OutputSpec::default()
        })
    }

    fn touch(dir: &TempDir, name: &str) {
        fs::write(dir.path().join(name), name).unwrap();
    }

    #[test]
    fn noop_when_under_limit() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "out.000.log");
        touch(&dir, "out.001.log");
        assert!(prune(dir.path(), &namer(), 2).is_empty());
        assert!(dir.path().join("out.000.log").exists());
    }

    #[test]
    fn removes_oldest_by_name() {
        let dir = TempDir::new().unwrap();
        for n in ["out.002.log", "out.000.log", "out.003.log", "out.001.log"] {
            touch(&dir, n);
        }
        let removed = prune(dir.path(), &namer(), 2);
        assert_eq!(
            removed,
            vec![dir.path().join("out.000.log"), dir.path().join("out.001.log")]
        );
        assert!(dir.path().join("out.002.log").exists());
        assert!(dir.path().join("out.003.log").exists());
    }

    #[test]
    fn ignores_pending_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "out.000.log");
        touch(&dir, "out.001.log");
        touch(&dir, "out.002.log.part");
        touch(&dir, "app.000.log");
        touch(&dir, "out.000.txt");
        let removed = prune(dir.path(), &namer(), 1);
        assert_eq!(removed, vec![dir.path().join("out.000.log")]);
        assert!(dir.path().join("out.002.log.part").exists());
        assert!(dir.path().join("app.000.log").exists());
        assert!(dir.path().join("out.000.txt").exists());
    }

    #[test]
    fn missing_directory_is_logged_not_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(prune(&dir.path().join("gone"), &namer(), 1).is_empty());
    }
}
