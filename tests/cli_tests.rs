//! Integration tests for the CLI interface
//!
//! Runs the demo binary end to end

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn stateflow() -> Command {
    let mut cmd = Command::cargo_bin("stateflow").unwrap();
    cmd.env_remove("STATEFLOW_DEBUG_MODE")
        .env_remove("STATEFLOW_SUBSCRIBER_CAPACITY")
        .env_remove("STATEFLOW_OVERFLOW");
    cmd
}

#[test]
fn test_cli_help_flag() {
    stateflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("ordering"));
}

#[test]
fn test_missing_subcommand_fails() {
    stateflow()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_subcommand() {
    stateflow()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_ordering_prints_execution_order() {
    stateflow()
        .arg("ordering")
        .assert()
        .success()
        .stdout(predicate::str::contains("[w1, s1, s2, s3, w2, s4, w3]"));
}

#[test]
fn test_counter_reports_final_count() {
    stateflow()
        .args(["counter", "-w", "4", "-n", "25"])
        .assert()
        .success()
        .stdout(predicate::str::contains("final count:    100"))
        .stdout(predicate::str::contains("gaps observed:  0"));
}

#[test]
fn test_fetch_prints_transitions() {
    stateflow()
        .args(["fetch", "--latency-ms", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Uninitialized"))
        .stdout(predicate::str::contains("Success(ada)"))
        .stdout(predicate::str::contains("Success(grace)"));
}

#[test]
fn test_fetch_failure_keeps_retained_value() {
    stateflow()
        .args(["fetch", "--fail", "--retain", "--latency-ms", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loading(retained=ada)"))
        .stdout(predicate::str::contains(
            "Fail(profile service unavailable, retained=ada)",
        ));
}

#[test]
fn test_config_file_is_applied() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("stateflow.toml");
    std::fs::write(
        &config_path,
        "debug_mode = false\nsubscriber_capacity = 8\noverflow = \"drop_oldest\"\n",
    )
    .unwrap();

    stateflow()
        .arg("-c")
        .arg(&config_path)
        .args(["counter", "-w", "2", "-n", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("final count:    20"));
}

#[test]
fn test_missing_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    stateflow()
        .arg("--config")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("ordering")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn test_invalid_config_value_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("stateflow.toml");
    std::fs::write(&config_path, "subscriber_capacity = 0\n").unwrap();

    stateflow()
        .arg("-c")
        .arg(&config_path)
        .arg("ordering")
        .assert()
        .failure()
        .stderr(predicate::str::contains("subscriber_capacity"));
}

#[test]
fn test_invalid_env_override_fails() {
    stateflow()
        .env("STATEFLOW_OVERFLOW", "sometimes")
        .arg("ordering")
        .assert()
        .failure()
        .stderr(predicate::str::contains("STATEFLOW_OVERFLOW"));
}
