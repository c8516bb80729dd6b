//! Error handling and exit codes without a running daemon.

use crate::prelude::*;

#[test]
fn unknown_subcommand_exits_with_caller_error() {
    let state = temp_state();
    fleet(&state).arg("frobnicate").assert().code(2).failure();
}

#[test]
fn status_without_daemon_exits_unhealthy() {
    let state = temp_state();
    let assert = fleet(&state).arg("status").assert().code(3);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("not running"), "stderr was: {}", stderr);
}

#[test]
fn task_status_without_daemon_exits_unhealthy() {
    let state = temp_state();
    fleet(&state)
        .args(["task", "status", "t-123"])
        .assert()
        .code(3);
}

#[test]
fn task_submit_rejects_bad_priority() {
    let state = temp_state();
    let assert = fleet(&state)
        .args(["task", "submit", "backend", "echo hi", "--priority", "urgent"])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("unknown priority"), "stderr was: {}", stderr);
}

#[test]
fn workflow_define_rejects_missing_file() {
    let state = temp_state();
    fleet(&state)
        .args(["workflow", "define", "/nonexistent/wf.json"])
        .assert()
        .code(1);
}
