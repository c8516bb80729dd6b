//! `fleetd` flag handling.

use crate::prelude::*;

#[test]
fn version_flag_prints_and_exits_zero() {
    let state = temp_state();
    let assert = fleetd(&state).arg("--version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("fleetd"));
}

#[test]
fn help_flag_mentions_the_cli() {
    let state = temp_state();
    let assert = fleetd(&state).arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("fleet"));
}

#[test]
fn unexpected_argument_is_rejected() {
    let state = temp_state();
    fleetd(&state).arg("--bogus").assert().code(1).failure();
}
