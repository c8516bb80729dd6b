// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session management adapters

mod noop;
mod tmux;

pub use noop::NoOpSessionAdapter;
pub use tmux::TmuxAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("{op} timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },
}

/// Raw adapter over a terminal multiplexer.
///
/// This layer is deliberately dumb: one multiplexer invocation per call, no
/// retries, no pacing. The write/commit discipline lives in
/// [`crate::driver::SessionDriver`].
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    /// Create a detached session, optionally launching a command in it
    async fn create(&self, name: &str, initial_command: Option<&str>)
        -> Result<(), SessionError>;

    /// Send literal text to a session (no key name interpretation)
    async fn send_literal(&self, name: &str, text: &str) -> Result<(), SessionError>;

    /// Send a named key (e.g. "Enter", "C-c") to a session
    async fn send_key(&self, name: &str, key: &str) -> Result<(), SessionError>;

    /// Kill a session
    async fn kill(&self, name: &str) -> Result<(), SessionError>;

    /// Check if a session exists
    async fn exists(&self, name: &str) -> Result<bool, SessionError>;

    /// Capture the visible pane, optionally limited to the last `lines` rows
    async fn capture(&self, name: &str, lines: Option<u32>) -> Result<String, SessionError>;

    /// List session names known to the multiplexer
    async fn list(&self) -> Result<Vec<String>, SessionError>;
}
