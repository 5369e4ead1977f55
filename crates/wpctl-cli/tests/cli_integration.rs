//! CLI Integration Tests
//!
//! These tests run the `wpctl` binary. None of them needs a controller;
//! network tests point at a closed local port.
//!
//! ```
//! cargo test --package wpctl-cli --test cli_integration
//! ```

use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

/// Run wpctl with a private config file and a clean environment.
fn run_wpctl(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wpctl"))
        .env_remove("WPCTL_URL")
        .env_remove("WPCTL_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("Failed to run wpctl binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_lists_commands() {
    let dir = tempdir().unwrap();
    let output = run_wpctl(&dir.path().join("config.toml"), &["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    for command in ["status", "history", "watch", "control", "config"] {
        assert!(help.contains(command), "help should mention {}", command);
    }
}

#[test]
fn test_version() {
    let dir = tempdir().unwrap();
    let output = run_wpctl(&dir.path().join("config.toml"), &["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("wpctl "));
}

#[test]
fn test_config_path_honours_flag() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    let output = run_wpctl(&path, &["config", "path"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), path.display().to_string());
}

#[test]
fn test_config_init_then_show() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wpctl").join("config.toml");

    let output = run_wpctl(&path, &["config", "init"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(path.exists());

    let output = run_wpctl(&path, &["config", "show"]);
    assert!(output.status.success());
    let shown = stdout(&output);
    assert!(shown.contains("base_url = \"http://raspberrypi.local:5000\""));
    assert!(shown.contains("interval_secs = 5"));

    // A second init must not clobber the file.
    let output = run_wpctl(&path, &["config", "init"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--force"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[polling]\ninterval_secs = 0\n").unwrap();

    let output = run_wpctl(&path, &["status"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("polling.interval_secs"));
}

#[test]
fn test_status_unreachable_controller_fails() {
    let dir = tempdir().unwrap();
    let output = run_wpctl(
        &dir.path().join("config.toml"),
        &["--quiet", "--url", "http://127.0.0.1:9", "status"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to read controller status"));
}

#[test]
fn test_status_rejects_csv() {
    let dir = tempdir().unwrap();
    let output = run_wpctl(
        &dir.path().join("config.toml"),
        &["--url", "http://127.0.0.1:9", "status", "--format", "csv"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("only available for history"));
}

#[test]
fn test_control_requires_state() {
    let dir = tempdir().unwrap();
    let output = run_wpctl(&dir.path().join("config.toml"), &["control", "bath", "maybe"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("expected on/off"));
}
