//! Integration tests for the `sensorlink` CLI binary.
//!
//! These tests cover argument parsing, config handling, and script
//! inspection, all without a live server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `sensorlink` binary with env isolation.
fn sensorlink_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("sensorlink");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("SENSORLINK_CONFIG")
        .env_remove("SENSORLINK_URL")
        .env_remove("SENSORLINK_OUTPUT")
        .env_remove("SENSORLINK_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = sensorlink_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    sensorlink_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("run")
                .and(predicate::str::contains("scripts"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    sensorlink_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sensorlink"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("custom.toml");
    sensorlink_cmd(home.path())
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("cfg").join("config.toml");

    sensorlink_cmd(home.path())
        .args(["config", "init", "--color", "never", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));
    assert!(path.exists());

    sensorlink_cmd(home.path())
        .args(["config", "init", "--color", "never", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("exists"));

    std::fs::write(
        &path,
        "[server]\nurl = \"http://127.0.0.1:1/hook\"\ntoken = \"hunter2\"\n",
    )
    .unwrap();
    sensorlink_cmd(home.path())
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("http://127.0.0.1:1/hook")
                .and(predicate::str::contains("<redacted>"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_run_rejects_invalid_url() {
    let home = tempfile::tempdir().unwrap();
    let output = sensorlink_cmd(home.path())
        .args(["run", "--once", "--no-scripts", "--no-external-ip"])
        .args(["--server", "not a url"])
        .arg("--config")
        .arg(home.path().join("absent.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("server.url"));
}

// ── Scripts ─────────────────────────────────────────────────────────

#[test]
fn test_scripts_list_missing_dir() {
    let home = tempfile::tempdir().unwrap();
    let output = sensorlink_cmd(home.path())
        .args(["scripts", "list", "--dir"])
        .arg(home.path().join("nope"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[cfg(unix)]
#[test]
fn test_scripts_run_and_list() {
    use std::os::unix::fs::PermissionsExt;

    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join("scripts");
    std::fs::create_dir_all(&dir).unwrap();
    let script = dir.join("disk.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\necho 'schedule: \"@every 1m\"'\necho 'sensors:'\necho '  - sensor_name: Disk Free'\necho '    sensor_state: 12'\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    sensorlink_cmd(home.path())
        .args(["scripts", "run", "-o", "plain"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("disk_free"));

    sensorlink_cmd(home.path())
        .args(["scripts", "list", "-o", "json", "--dir"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("@every 1m"));
}
