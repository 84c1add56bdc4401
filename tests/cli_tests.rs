//! Integration tests for the cadre CLI
//!
//! These run the actual binary and verify output and exit status.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the binary to test
fn cadre_cmd() -> Command {
    Command::cargo_bin("cadre").unwrap()
}

const VALID_PIPELINE: &str = r#"
name: review
capability: mock
workers:
  - id: reviewer
    role: "Code reviewer"
    objective: "Review code"
tasks:
  - id: review
    worker: reviewer
    instructions: "Review ${input.codebase_path}"
    expected_output: "Findings"
  - id: report
    worker: reviewer
    instructions: "Summarize the review"
    expected_output: "Report"
    context: [review]
"#;

fn write_pipeline(dir: &TempDir, contents: &str) -> String {
    let path = dir.path().join("review.cadre.yaml");
    fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn help_flag() {
    cadre_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "run sequential pipelines of specialized AI workers",
        ));
}

#[test]
fn validate_valid_pipeline() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);

    cadre_cmd()
        .args(["validate", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("Tasks: 2"))
        .stdout(predicate::str::contains("Workers: 1"));
}

#[test]
fn validate_rejects_forward_reference() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(
        &dir,
        r#"
name: bad
workers:
  - id: w
    role: "r"
    objective: "o"
tasks:
  - id: first
    worker: w
    instructions: "x"
    expected_output: "y"
    context: [second]
  - id: second
    worker: w
    instructions: "x"
    expected_output: "y"
"#,
    );

    cadre_cmd()
        .args(["validate", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid pipeline definition"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn validate_rejects_unknown_worker() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(
        &dir,
        r#"
name: bad
workers: []
tasks:
  - id: t1
    worker: ghost
    instructions: "x"
    expected_output: "y"
"#,
    );

    cadre_cmd()
        .args(["validate", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn run_with_mock_capability_prints_output() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);
    let state_dir = dir.path().join("state");

    cadre_cmd()
        .args([
            "run",
            &file,
            "--state-dir",
            state_dir.to_str().unwrap(),
            "-i",
            "codebase_path=/repo",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed 2 tasks"))
        .stdout(predicate::str::contains("Mock response"));
}

#[test]
fn run_rejects_malformed_input() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);

    cadre_cmd()
        .args(["run", &file, "-i", "not-an-assignment"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key=value"));
}

#[test]
fn replay_without_history_fails() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);
    let state_dir = dir.path().join("state");

    cadre_cmd()
        .args([
            "replay",
            &file,
            "--state-dir",
            state_dir.to_str().unwrap(),
            "--from",
            "report",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no prior run"));
}

#[test]
fn replay_after_run_succeeds() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);
    let state_dir = dir.path().join("state");
    let state = state_dir.to_str().unwrap();

    cadre_cmd()
        .args(["run", &file, "--state-dir", state, "-i", "codebase_path=/repo"])
        .assert()
        .success();

    cadre_cmd()
        .args(["replay", &file, "--state-dir", state, "--from", "report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed 2 tasks"))
        .stdout(predicate::str::contains("run #2"));
}

#[test]
fn replay_unknown_task_fails() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);
    let state_dir = dir.path().join("state");

    cadre_cmd()
        .args([
            "replay",
            &file,
            "--state-dir",
            state_dir.to_str().unwrap(),
            "--from",
            "ghost",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown task identifier"));
}

#[test]
fn train_writes_checkpoint() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);
    let state_dir = dir.path().join("state");
    let checkpoint = dir.path().join("learn.json");

    cadre_cmd()
        .args([
            "train",
            &file,
            "--state-dir",
            state_dir.to_str().unwrap(),
            "-n",
            "2",
            "--checkpoint",
            checkpoint.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trained 2 iterations"));

    assert!(checkpoint.exists());
}

#[test]
fn train_rejects_zero_iterations() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);
    let checkpoint = dir.path().join("learn.json");

    cadre_cmd()
        .args([
            "train",
            &file,
            "-n",
            "0",
            "--checkpoint",
            checkpoint.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1 iteration"));
}

#[test]
fn test_mode_prints_one_score_per_iteration() {
    let dir = TempDir::new().unwrap();
    let file = write_pipeline(&dir, VALID_PIPELINE);
    let state_dir = dir.path().join("state");

    // The mock evaluator replies with no numeric score, so iterations are
    // scored as failing - but all of them are still reported.
    cadre_cmd()
        .args([
            "test",
            &file,
            "--state-dir",
            state_dir.to_str().unwrap(),
            "-n",
            "3",
            "--evaluator",
            "mock",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("iteration 1"))
        .stdout(predicate::str::contains("iteration 2"))
        .stdout(predicate::str::contains("iteration 3"))
        .stdout(predicate::str::contains("average:"));
}

#[test]
fn missing_pipeline_file_fails_with_diagnostic() {
    cadre_cmd()
        .args(["validate", "does-not-exist.cadre.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("Fix:"));
}
