//! `fleet --help` and `--version` behave like a well-mannered CLI.

use crate::prelude::*;

fn stdout_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).to_string()
}

#[test]
fn help_lists_core_commands() {
    let state = temp_state();
    let assert = fleet(&state).arg("--help").assert().success();
    let stdout = stdout_of(assert);

    for command in ["start", "stop", "status", "agent", "task", "workflow"] {
        assert!(stdout.contains(command), "help is missing `{}`", command);
    }
}

#[test]
fn version_prints_and_exits_zero() {
    let state = temp_state();
    let assert = fleet(&state).arg("--version").assert().success();
    assert!(stdout_of(assert).contains("fleet"));
}

#[test]
fn subcommand_help_shows_usage() {
    let state = temp_state();
    let assert = fleet(&state).args(["task", "--help"]).assert().success();
    let stdout = stdout_of(assert);
    assert!(stdout.contains("submit"));
    assert!(stdout.contains("cancel"));
}
