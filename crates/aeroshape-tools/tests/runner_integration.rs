//! Integration tests for external tool execution.

use aeroshape_tools::{BuiltinTool, ToolCommand, ToolError, ToolRunner};
use std::path::Path;
use std::time::Instant;

/// Test: a tool exceeding its timeout is reported as `Timeout` and does not
/// block the caller for the full duration.
#[tokio::test]
async fn test_timeout_kills_long_running_tool() {
    let command = ToolCommand::new("sleeper", "sleep").arg("30").timeout_secs(1);

    let start = Instant::now();
    let err = ToolRunner::execute(&command).await.unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert!(
        start.elapsed().as_secs() < 10,
        "runner should return shortly after the timeout"
    );
}

/// Test: a timed-out tool still leaves the output it printed so far in its
/// log file.
#[tokio::test]
async fn test_timeout_writes_partial_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("solver.log");
    let command = ToolCommand::new("slow_solver", "sh")
        .args(["-c", "echo 'Iter 1 rms -2.0'; sleep 30"])
        .timeout_secs(1)
        .log_to(&log);

    let err = ToolRunner::execute(&command).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);

    let content = std::fs::read_to_string(&log).expect("partial log written");
    assert!(content.contains("Iter 1 rms -2.0"));
    assert!(content.contains("timed out after 1 s"));
}

/// Test: a missing executable surfaces as a spawn error.
#[tokio::test]
async fn test_missing_executable_is_unavailable() {
    let command = BuiltinTool::Su2Cfd.command(Some(Path::new("/nonexistent/bin/SU2_CFD")));

    let err = ToolRunner::execute(&command).await.unwrap_err();
    assert!(err.is_unavailable());
    match err {
        ToolError::Spawn { name, .. } => assert_eq!(name, "su2_cfd"),
        other => panic!("expected Spawn, got {:?}", other),
    }
}

/// Test: the child runs in the configured working directory and its output
/// is persisted to the log file.
#[tokio::test]
async fn test_working_dir_and_log_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("tool.log");

    let command = ToolCommand::new("pwd_test", "pwd")
        .current_dir(dir.path())
        .timeout_secs(30)
        .log_to(&log);

    let result = ToolRunner::execute(&command).await.expect("execute failed");
    assert!(result.passed());

    let canonical = dir.path().canonicalize().expect("canonicalize");
    let reported = Path::new(result.stdout.trim())
        .canonicalize()
        .expect("canonicalize stdout");
    assert_eq!(reported, canonical);

    let content = std::fs::read_to_string(&log).expect("log written");
    assert!(content.contains("--- stdout ---"));
    assert!(content.contains("exit code 0"));
}

/// Test: a non-zero exit is a completed run, not an error.
#[tokio::test]
async fn test_nonzero_exit_is_reported_in_output() {
    let command = ToolCommand::new("sh_fail", "sh")
        .args(["-c", "echo boom >&2; exit 3"])
        .timeout_secs(30);

    let result = ToolRunner::execute(&command).await.expect("execute failed");
    assert!(!result.passed());
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.tail(1), "boom");
}
