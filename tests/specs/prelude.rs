//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Returns the path to a workspace binary.
///
/// Falls back to resolving relative to the test binary itself when
/// CARGO_MANIFEST_DIR is stale (e.g. compiled into a shared target
/// directory).
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // The test binary lives at target/debug/deps/specs-<hash>, so its
    // grandparent is target/debug/ where fleet and fleetd are built.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

/// A `fleet` command pointed at an isolated, daemon-less state dir.
pub fn fleet(state: &TempDir) -> Command {
    let mut cmd = Command::from_std(std::process::Command::new(binary_path("fleet")));
    cmd.env("FLEET_STATE_DIR", state.path());
    cmd
}

/// A `fleetd` command pointed at an isolated state dir.
pub fn fleetd(state: &TempDir) -> Command {
    let mut cmd = Command::from_std(std::process::Command::new(binary_path("fleetd")));
    cmd.env("FLEET_STATE_DIR", state.path());
    cmd
}

pub fn temp_state() -> TempDir {
    tempfile::tempdir().expect("temp state dir")
}
