// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI error type carrying the process exit code.
//!
//! Exit codes: 0 success, 1 caller error, 2 not-found, 3 subsystem unhealthy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad input or a failed operation (exit 1)
    #[error("{0}")]
    Caller(String),

    /// The referenced entity does not exist (exit 2)
    #[error("{0}")]
    NotFound(String),

    /// The daemon or a subsystem is down (exit 3)
    #[error("{0}")]
    Unhealthy(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Caller(_) => 1,
            CliError::NotFound(_) => 2,
            CliError::Unhealthy(_) => 3,
        }
    }

    pub fn caller(message: impl Into<String>) -> Self {
        CliError::Caller(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CliError::NotFound(message.into())
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        CliError::Unhealthy(message.into())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Caller(e.to_string())
    }
}

#[cfg(test)]
#[path = "exit_error_tests.rs"]
mod tests;
