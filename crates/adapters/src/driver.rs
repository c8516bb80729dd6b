// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disciplined wrapper around a session adapter.
//!
//! The driver owns the write/commit discipline: every command is delivered as
//! two multiplexer writes (the literal text, then the Enter key) separated by
//! a mandatory pause. Skipping the pause loses 30-40% of commands under load,
//! so the delay is a correctness requirement, not a tuning knob: a
//! [`CommitDelay`] below 100ms cannot be constructed.

use crate::session::{SessionAdapter, SessionError};
use std::time::Duration;
use thiserror::Error;

/// Minimum commit delay. Values below this lose keystrokes.
pub const MIN_COMMIT_DELAY: Duration = Duration::from_millis(100);

/// Pause between killing and recreating a session on restart
const RESTART_SETTLE: Duration = Duration::from_millis(500);

/// Rejected commit delay configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("commit delay {seconds}s is below the {}ms minimum", MIN_COMMIT_DELAY.as_millis())]
pub struct CommitDelayError {
    pub seconds: f64,
}

/// Validated pause between the payload write and the commit keystroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitDelay(Duration);

impl CommitDelay {
    /// Construct from seconds. Values below 0.1s (including zero) are
    /// rejected.
    pub fn from_seconds(seconds: f64) -> Result<Self, CommitDelayError> {
        if !seconds.is_finite() || seconds < 0.1 {
            return Err(CommitDelayError { seconds });
        }
        Ok(Self(Duration::from_secs_f64(seconds)))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for CommitDelay {
    fn default() -> Self {
        Self(MIN_COMMIT_DELAY)
    }
}

/// Terminal session driver: adapter + commit discipline.
///
/// One driver is shared by all bridges; sessions are still single-writer
/// because each session belongs to exactly one bridge.
#[derive(Clone)]
pub struct SessionDriver<A: SessionAdapter> {
    adapter: A,
    commit_delay: CommitDelay,
}

impl<A: SessionAdapter> SessionDriver<A> {
    pub fn new(adapter: A, commit_delay: CommitDelay) -> Self {
        Self {
            adapter,
            commit_delay,
        }
    }

    pub fn commit_delay(&self) -> Duration {
        self.commit_delay.as_duration()
    }

    pub async fn session_exists(&self, name: &str) -> Result<bool, SessionError> {
        self.adapter.exists(name).await
    }

    pub async fn create_session(
        &self,
        name: &str,
        initial_command: Option<&str>,
    ) -> Result<(), SessionError> {
        tracing::info!(session = name, "creating session");
        self.adapter.create(name, initial_command).await
    }

    pub async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        tracing::info!(session = name, "killing session");
        self.adapter.kill(name).await
    }

    /// Kill and recreate a session, giving the multiplexer a moment to
    /// release the old one.
    pub async fn restart_session(
        &self,
        name: &str,
        initial_command: Option<&str>,
    ) -> Result<(), SessionError> {
        self.adapter.kill(name).await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.adapter.create(name, initial_command).await
    }

    /// Send a line of text and commit it with Enter.
    ///
    /// The pause between the two writes is the commit delay; both writes must
    /// succeed for the command to count as delivered.
    pub async fn send_command(&self, name: &str, text: &str) -> Result<(), SessionError> {
        self.adapter.send_literal(name, text).await?;
        tokio::time::sleep(self.commit_delay.as_duration()).await;
        self.adapter.send_key(name, "Enter").await
    }

    /// Send raw keys without a commit. Used for control sequences.
    pub async fn send_keys(&self, name: &str, raw_keys: &str) -> Result<(), SessionError> {
        self.adapter.send_key(name, raw_keys).await
    }

    pub async fn capture_pane(
        &self,
        name: &str,
        last_n_lines: Option<u32>,
    ) -> Result<String, SessionError> {
        self.adapter.capture(name, last_n_lines).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        self.adapter.list().await
    }

    /// Probe the multiplexer itself (used by the health collector).
    pub async fn probe(&self) -> Result<(), SessionError> {
        self.adapter.list().await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
