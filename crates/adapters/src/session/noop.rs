// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op session adapter for when session management is disabled.

use super::{SessionAdapter, SessionError};
use async_trait::async_trait;

/// Session adapter that does nothing.
///
/// Used when agent sessions are managed entirely out of process.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpSessionAdapter;

impl NoOpSessionAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionAdapter for NoOpSessionAdapter {
    async fn create(
        &self,
        _name: &str,
        _initial_command: Option<&str>,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    async fn send_literal(&self, _name: &str, _text: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn send_key(&self, _name: &str, _key: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn kill(&self, _name: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn exists(&self, _name: &str) -> Result<bool, SessionError> {
        Ok(false)
    }

    async fn capture(&self, _name: &str, _lines: Option<u32>) -> Result<String, SessionError> {
        Ok(String::new())
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        Ok(Vec::new())
    }
}
