// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux session adapter

use super::{SessionAdapter, SessionError};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Timeout for control operations (create, send, kill, has-session)
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for pane capture, which can be slow on large scrollback
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tmux-based session adapter
#[derive(Clone, Default)]
pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }
}

async fn run_tmux(
    op: &'static str,
    args: &[&str],
    timeout: Duration,
) -> Result<Output, SessionError> {
    let fut = Command::new("tmux").args(args).output();
    let output = tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| SessionError::Timeout {
            op,
            secs: timeout.as_secs(),
        })?
        .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
    Ok(output)
}

#[async_trait]
impl SessionAdapter for TmuxAdapter {
    async fn create(
        &self,
        name: &str,
        initial_command: Option<&str>,
    ) -> Result<(), SessionError> {
        // Kill any stale session of the same name first
        let existing = run_tmux("has-session", &["has-session", "-t", name], CONTROL_TIMEOUT).await;
        if existing.map(|o| o.status.success()).unwrap_or(false) {
            tracing::warn!(session = name, "session already exists, killing first");
            let _ = run_tmux("kill-session", &["kill-session", "-t", name], CONTROL_TIMEOUT).await;
        }

        let mut args = vec!["new-session", "-d", "-s", name];
        if let Some(cmd) = initial_command {
            args.push(cmd);
        }

        let output = run_tmux("new-session", &args, CONTROL_TIMEOUT).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(session = name, stderr = %stderr, "tmux spawn failed");
            return Err(SessionError::SpawnFailed(stderr.to_string()));
        }

        // Log stderr even on success - may contain useful warnings
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(session = name, stderr = %stderr, "tmux spawn stderr (non-fatal)");
        }

        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), SessionError> {
        // -l = literal mode (no key name interpretation)
        // -- = end of options (handles text starting with -)
        let output = run_tmux(
            "send-keys",
            &["send-keys", "-t", name, "-l", "--", text],
            CONTROL_TIMEOUT,
        )
        .await?;

        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_key(&self, name: &str, key: &str) -> Result<(), SessionError> {
        let output = run_tmux(
            "send-keys",
            &["send-keys", "-t", name, key],
            CONTROL_TIMEOUT,
        )
        .await?;

        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), SessionError> {
        let output = run_tmux(
            "kill-session",
            &["kill-session", "-t", name],
            CONTROL_TIMEOUT,
        )
        .await?;

        if !output.status.success() {
            // Session might already be dead, which is fine
        }

        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, SessionError> {
        let output = run_tmux("has-session", &["has-session", "-t", name], CONTROL_TIMEOUT).await?;
        Ok(output.status.success())
    }

    async fn capture(&self, name: &str, lines: Option<u32>) -> Result<String, SessionError> {
        let start;
        let mut args = vec!["capture-pane", "-t", name, "-p"];
        if let Some(n) = lines {
            start = format!("-{}", n);
            args.push("-S");
            args.push(&start);
        }

        let output = run_tmux("capture-pane", &args, CAPTURE_TIMEOUT).await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        let output = run_tmux(
            "list-sessions",
            &["list-sessions", "-F", "#{session_name}"],
            CONTROL_TIMEOUT,
        )
        .await?;

        // No server running means no sessions, not an error
        if !output.status.success() {
            return Ok(Vec::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}
