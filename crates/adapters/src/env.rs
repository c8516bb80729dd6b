// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use crate::driver::{CommitDelay, CommitDelayError};

/// Environment variable controlling the per-send commit pause.
pub const COMMIT_DELAY_VAR: &str = "ORCHESTRATOR_COMMIT_DELAY_SECONDS";

/// Read the commit delay from the environment.
///
/// Defaults to 0.1s when unset. Unparseable or sub-minimum values are
/// rejected so a misconfigured deployment fails at startup instead of
/// silently dropping keystrokes.
pub fn commit_delay() -> Result<CommitDelay, CommitDelayError> {
    match std::env::var(COMMIT_DELAY_VAR) {
        Err(_) => Ok(CommitDelay::default()),
        Ok(raw) => {
            let seconds: f64 = raw
                .trim()
                .parse()
                .map_err(|_| CommitDelayError { seconds: -1.0 })?;
            CommitDelay::from_seconds(seconds)
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
