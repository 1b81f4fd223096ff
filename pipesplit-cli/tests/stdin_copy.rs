//! End-to-end runs of the `pipesplit` binary reading standard input.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pipesplit() -> Command {
    let mut cmd = Command::cargo_bin("pipesplit").expect("binary built");
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn outputs(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .expect("read output dir")
        .map(|e| e.expect("entry"))
        .map(|e| {
            (
                e.file_name().to_string_lossy().into_owned(),
                fs::read(e.path()).expect("read output"),
            )
        })
        .collect();
    files.sort();
    files
}

#[test]
fn stdin_lands_in_single_file() {
    let dir = TempDir::new().expect("tempdir");
    pipesplit()
        .args(["-o"])
        .arg(dir.path())
        .args(["-p", "app"])
        .write_stdin("hello world\n")
        .assert()
        .success();

    assert_eq!(
        outputs(dir.path()),
        vec![("app.00000000".to_owned(), b"hello world\n".to_vec())]
    );
}

#[test]
fn empty_stdin_creates_one_empty_file() {
    let dir = TempDir::new().expect("tempdir");
    pipesplit()
        .arg("-o")
        .arg(dir.path())
        .write_stdin("")
        .assert()
        .success();

    assert_eq!(outputs(dir.path()), vec![("out.00000000".to_owned(), Vec::new())]);
}

#[test]
fn large_input_rotates_and_concatenates_back() {
    let dir = TempDir::new().expect("tempdir");
    let input: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();

    pipesplit()
        .arg("-o")
        .arg(dir.path())
        .args(["--max-bytes", "64KiB", "--suffix", ".bin"])
        .write_stdin(input.clone())
        .assert()
        .success();

    let files = outputs(dir.path());
    assert!(files.len() >= 5, "expected several files, got {}", files.len());
    assert!(files.iter().all(|(name, _)| name.ends_with(".bin")));
    assert!(files.iter().all(|(_, c)| c.len() <= 64 * 1024));
    let joined: Vec<u8> = files.into_iter().flat_map(|(_, c)| c).collect();
    assert_eq!(joined, input);
}

#[test]
fn summary_reports_counters_as_json() {
    let dir = TempDir::new().expect("tempdir");
    pipesplit()
        .arg("-o")
        .arg(dir.path())
        .arg("--summary")
        .write_stdin("abc")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bytes\":3"))
        .stdout(predicate::str::contains("\"files\":1"));
}

#[test]
fn restart_continues_sequence() {
    let dir = TempDir::new().expect("tempdir");
    for payload in ["run one", "run two"] {
        pipesplit()
            .arg("-o")
            .arg(dir.path())
            .write_stdin(payload)
            .assert()
            .success();
    }
    assert_eq!(
        outputs(dir.path()),
        vec![
            ("out.00000000".to_owned(), b"run one".to_vec()),
            ("out.00000001".to_owned(), b"run two".to_vec()),
        ]
    );
}

#[test]
fn pid_file_is_removed_on_exit() {
    let dir = TempDir::new().expect("tempdir");
    let pid = dir.path().join("pipesplit.pid");
    pipesplit()
        .arg("-o")
        .arg(dir.path().join("out"))
        .arg("--daemon")
        .arg("--pid-file")
        .arg(&pid)
        .write_stdin("x")
        .assert()
        .success();
    assert!(!pid.exists());
}

#[test]
fn zero_max_bytes_is_configuration_error() {
    let dir = TempDir::new().expect("tempdir");
    pipesplit()
        .arg("-o")
        .arg(dir.path())
        .args(["--max-bytes", "0"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("max bytes"));
    assert!(outputs(dir.path()).is_empty());
}

#[test]
fn continue_read_without_daemon_is_configuration_error() {
    pipesplit()
        .arg("--continue-read")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("daemon"));
}

#[test]
fn missing_pipe_is_source_unavailable() {
    let dir = TempDir::new().expect("tempdir");
    pipesplit()
        .arg("-o")
        .arg(dir.path().join("out"))
        .arg("--input")
        .arg(dir.path().join("absent.fifo"))
        .assert()
        .code(66)
        .stderr(predicate::str::contains("unavailable"));
}

#[test]
fn print_config_merges_file_and_flags() {
    let dir = TempDir::new().expect("tempdir");
    let file = dir.path().join("pipesplit.yaml");
    fs::write(
        &file,
        "output:\n  prefix: fromfile\nrotation:\n  max_bytes: 100\n  max_age: 1h\n",
    )
    .expect("write config");

    pipesplit()
        .arg("--config")
        .arg(&file)
        .args(["--max-bytes", "2K", "--print-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("prefix: fromfile"))
        .stdout(predicate::str::contains("max_bytes: 2000"))
        .stdout(predicate::str::contains("max_age: 1h"));
}

#[test]
fn unreadable_config_file_is_configuration_error() {
    let dir = TempDir::new().expect("tempdir");
    pipesplit()
        .arg("--config")
        .arg(dir.path().join("missing.yaml"))
        .assert()
        .code(78)
        .stderr(predicate::str::contains("missing.yaml"));
}
