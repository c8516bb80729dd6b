// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy.
//!
//! Transient errors are absorbed by retry or breaker at the nearest
//! responsible layer (bridge for driver errors, queue for task-state errors,
//! workflow engine for step errors); only fatal outcomes cross the API
//! boundary.

use fleet_adapters::SessionError;
use fleet_bus::{BusError, StoreError};
use fleet_core::workflow::WorkflowValidationError;
use fleet_core::{AgentId, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// External dependency (store, bus, multiplexer) failed; retryable
    #[error("transient dependency failure: {0}")]
    Transient(String),

    /// Task exceeded its timeout budget; counted as a retryable failure
    #[error("task {id} hit its timeout after {seconds}s")]
    TaskTimeout { id: TaskId, seconds: u64 },

    /// Target agent's heartbeat is stale; task stays pending
    #[error("agent offline: {0}")]
    AgentOffline(AgentId),

    /// Breaker rejected the call; callers treat this like AgentOffline
    #[error("circuit open for {0}")]
    CircuitOpen(String),

    /// Malformed task or workflow definition; fatal for the submission
    #[error("validation failed: {0}")]
    Validation(String),

    /// Agent pane output violated the sentinel contract; non-retriable
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// Programmer error; logged at error level, task fails non-retriably
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<WorkflowValidationError> for EngineError {
    fn from(e: WorkflowValidationError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TaskNotFound(id) => EngineError::TaskNotFound(id),
            other => EngineError::Transient(other.to_string()),
        }
    }
}

impl From<BusError> for EngineError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::ConflictingResult(id) => {
                EngineError::Protocol(format!("conflicting result for task {}", id))
            }
            BusError::Store(s) => s.into(),
            other => EngineError::Transient(other.to_string()),
        }
    }
}

impl From<SessionError> for EngineError {
    fn from(e: SessionError) -> Self {
        EngineError::Transient(e.to_string())
    }
}
