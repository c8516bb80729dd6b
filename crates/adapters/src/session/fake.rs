// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{SessionAdapter, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// Recorded session call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Create {
        name: String,
        initial_command: Option<String>,
    },
    SendLiteral {
        name: String,
        text: String,
    },
    SendKey {
        name: String,
        key: String,
    },
    Kill {
        name: String,
    },
    Exists {
        name: String,
    },
    Capture {
        name: String,
        lines: Option<u32>,
    },
    List,
}

/// A recorded call with the tokio instant it happened at.
///
/// Timestamps use tokio's clock so paused-time tests can assert on the
/// spacing between writes.
#[derive(Debug, Clone)]
pub struct TimedCall {
    pub call: SessionCall,
    pub at: Instant,
}

/// Fake session state
#[derive(Debug, Clone)]
pub struct FakeSession {
    pub name: String,
    pub initial_command: Option<String>,
    /// Scripted pane contents, one entry per rendered line
    pub output: Vec<String>,
    pub alive: bool,
}

struct FakeSessionState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<TimedCall>,
    failing: bool,
}

/// Fake session adapter for testing
#[derive(Clone)]
pub struct FakeSessionAdapter {
    inner: Arc<Mutex<FakeSessionState>>,
}

impl Default for FakeSessionAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeSessionState {
                sessions: HashMap::new(),
                calls: Vec::new(),
                failing: false,
            })),
        }
    }
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.iter().map(|t| t.call.clone()).collect()
    }

    /// Get all recorded calls with their tokio timestamps
    pub fn timed_calls(&self) -> Vec<TimedCall> {
        self.inner.lock().calls.clone()
    }

    /// Get a session by name
    pub fn get_session(&self, name: &str) -> Option<FakeSession> {
        self.inner.lock().sessions.get(name).cloned()
    }

    /// Add a pre-existing session
    pub fn add_session(&self, name: &str) {
        self.inner.lock().sessions.insert(
            name.to_string(),
            FakeSession {
                name: name.to_string(),
                initial_command: None,
                output: Vec::new(),
                alive: true,
            },
        );
    }

    /// Replace a session's scripted pane output
    pub fn set_output(&self, name: &str, output: Vec<String>) {
        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.output = output;
        }
    }

    /// Append lines to a session's scripted pane output
    pub fn append_output(&self, name: &str, lines: &[&str]) {
        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.output.extend(lines.iter().map(|l| l.to_string()));
        }
    }

    /// Mark a session dead
    pub fn set_alive(&self, name: &str, alive: bool) {
        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.alive = alive;
        }
    }

    /// When set, every send/capture call fails with CommandFailed
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    fn record(&self, call: SessionCall) {
        self.inner.lock().calls.push(TimedCall {
            call,
            at: Instant::now(),
        });
    }

    fn check_failing(&self) -> Result<(), SessionError> {
        if self.inner.lock().failing {
            Err(SessionError::CommandFailed("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn create(
        &self,
        name: &str,
        initial_command: Option<&str>,
    ) -> Result<(), SessionError> {
        self.record(SessionCall::Create {
            name: name.to_string(),
            initial_command: initial_command.map(str::to_string),
        });
        self.check_failing()?;

        self.inner.lock().sessions.insert(
            name.to_string(),
            FakeSession {
                name: name.to_string(),
                initial_command: initial_command.map(str::to_string),
                output: Vec::new(),
                alive: true,
            },
        );
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), SessionError> {
        self.record(SessionCall::SendLiteral {
            name: name.to_string(),
            text: text.to_string(),
        });
        self.check_failing()?;

        if !self.inner.lock().sessions.contains_key(name) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_key(&self, name: &str, key: &str) -> Result<(), SessionError> {
        self.record(SessionCall::SendKey {
            name: name.to_string(),
            key: key.to_string(),
        });
        self.check_failing()?;

        if !self.inner.lock().sessions.contains_key(name) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), SessionError> {
        self.record(SessionCall::Kill {
            name: name.to_string(),
        });

        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.alive = false;
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, SessionError> {
        self.record(SessionCall::Exists {
            name: name.to_string(),
        });

        Ok(self
            .inner
            .lock()
            .sessions
            .get(name)
            .map(|s| s.alive)
            .unwrap_or(false))
    }

    async fn capture(&self, name: &str, lines: Option<u32>) -> Result<String, SessionError> {
        self.record(SessionCall::Capture {
            name: name.to_string(),
            lines,
        });
        self.check_failing()?;

        let inner = self.inner.lock();
        match inner.sessions.get(name) {
            Some(session) => {
                let take = lines.map(|n| n as usize).unwrap_or(session.output.len());
                let start = session.output.len().saturating_sub(take);
                Ok(session.output[start..].join("\n"))
            }
            None => Err(SessionError::NotFound(name.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        self.record(SessionCall::List);

        let inner = self.inner.lock();
        let mut names: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.alive)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
