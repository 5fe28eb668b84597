// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cadenced command-line behaviour

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{BufRead, BufReader};
use std::process::Stdio;
use std::time::Duration;

fn cadenced() -> Command {
    Command::cargo_bin("cadenced").unwrap()
}

#[test]
fn help_prints_usage() {
    cadenced()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: cadenced [OPTIONS] [CONFIG]"))
        .stdout(predicate::str::contains("--check"));
}

#[test]
fn version_prints_package_version() {
    cadenced()
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_option_is_a_usage_error() {
    cadenced()
        .arg("--frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unexpected argument '--frobnicate'"));
}

#[test]
fn check_accepts_defaults() {
    cadenced()
        .arg("--check")
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration ok"));
}

#[test]
fn check_accepts_an_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.toml");
    std::fs::write(&path, "").unwrap();

    cadenced().arg("--check").arg(&path).assert().success();
}

#[test]
fn check_reports_a_missing_file() {
    cadenced()
        .args(["--check", "/nonexistent/cadence.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/cadence.toml"));
}

#[test]
fn check_rejects_invalid_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.toml");
    std::fs::write(&path, "[scheduler]\nutc_offset = \"somewhere\"\n").unwrap();

    cadenced()
        .arg("--check")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid utc offset"));
}

#[test]
fn check_rejects_a_broken_seed() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.json");
    std::fs::write(
        &seed,
        r#"{ "enrollments": [{ "id": "enr-1", "subject_id": "ghost", "program_id": "p",
             "status": "active", "current_step": 1, "total_steps": 1,
             "completed_steps": 0, "adherence_rate": 0.0,
             "assigned_at": "2026-05-04T09:00:00Z" }] }"#,
    )
    .unwrap();
    let path = dir.path().join("cadence.toml");
    std::fs::write(&path, format!("seed_path = {:?}\n", seed.display().to_string())).unwrap();

    cadenced()
        .arg("--check")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown subject ghost"));
}

#[test]
fn sigterm_stops_the_daemon_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let path = dir.path().join("cadence.toml");
    std::fs::write(
        &path,
        format!(
            "state_dir = {:?}\nlog_path = {:?}\n",
            state_dir.display().to_string(),
            dir.path().join("cadenced.log").display().to_string()
        ),
    )
    .unwrap();

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("cadenced"))
        .arg(&path)
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let mut ready = String::new();
    BufReader::new(child.stdout.take().unwrap())
        .read_line(&mut ready)
        .unwrap();
    assert_eq!(ready.trim(), "READY");
    assert!(state_dir.join("cadenced.pid").exists());

    let killed = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let mut status = None;
    for _ in 0..100 {
        if let Some(exit) = child.try_wait().unwrap() {
            status = Some(exit);
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let status = status.unwrap_or_else(|| {
        let _ = child.kill();
        panic!("cadenced did not exit after SIGTERM");
    });
    assert!(status.success());
    assert!(!state_dir.join("cadenced.pid").exists());
    assert!(state_dir.join("snapshots").join("queue.json").exists());
}
