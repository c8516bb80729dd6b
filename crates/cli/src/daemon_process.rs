// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning and waiting for the fleetd process.

use crate::exit_error::CliError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// How long to wait for the daemon's READY marker.
const READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Locate the fleetd binary: next to this executable, else on PATH.
fn daemon_binary() -> std::path::PathBuf {
    if let Ok(me) = std::env::current_exe() {
        if let Some(dir) = me.parent() {
            let sibling = dir.join("fleetd");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    std::path::PathBuf::from("fleetd")
}

/// Spawn fleetd detached and wait for it to print READY.
pub async fn spawn_and_wait() -> Result<(), CliError> {
    let mut child = Command::new(daemon_binary())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| CliError::unhealthy(format!("failed to spawn fleetd: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CliError::unhealthy("fleetd produced no stdout"))?;
    let mut lines = BufReader::new(stdout).lines();

    let ready = tokio::time::timeout(READY_TIMEOUT, async {
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "READY" {
                return true;
            }
        }
        false
    })
    .await;

    match ready {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::unhealthy(
            "fleetd exited before becoming ready (check the daemon log)",
        )),
        Err(_) => Err(CliError::unhealthy("fleetd did not become ready in time")),
    }
}
