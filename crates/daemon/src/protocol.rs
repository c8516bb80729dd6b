// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC Protocol for daemon communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

use std::collections::HashMap;

use fleet_core::workflow::WorkflowSpec;
use fleet_core::{Event, TaskConfig};
use serde::{Deserialize, Serialize};

#[path = "protocol_types.rs"]
mod types;
pub use types::{
    AgentEntry, ExecutionDetail, QueueDepthEntry, StatusReport, StepEntry, TaskDetail,
};

#[path = "protocol_wire.rs"]
pub mod wire;

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Get daemon status
    Status,

    /// Request daemon shutdown
    Shutdown,

    /// Submit a task
    TaskSubmit { config: TaskConfig },

    /// Query one task
    TaskStatus { id: String },

    /// Cancel a task
    TaskCancel { id: String },

    /// List agents with their records
    AgentList,

    /// Kill and recreate an agent's session
    AgentRestart { id: String },

    /// Validate and register a workflow
    WorkflowDefine { spec: WorkflowSpec },

    /// Start a run of a defined workflow
    WorkflowExecute {
        workflow_id: String,
        #[serde(default)]
        params: HashMap<String, String>,
    },

    /// Query one execution
    WorkflowStatus { execution_id: String },

    /// Cancel an execution
    WorkflowCancel { execution_id: String },

    /// Aggregated component health
    Health,

    /// Metrics in text exposition format
    Metrics,

    /// Stream lifecycle events until the connection closes
    EventsSubscribe {
        /// Event-name pattern, e.g. `task:*` or `workflow:step_failed`;
        /// absent means everything
        #[serde(default)]
        pattern: Option<String>,
    },
}

/// Match an event name against a subscription pattern.
///
/// `*` alone matches everything; a trailing `*` matches by prefix; anything
/// else is an exact name match.
pub fn pattern_matches(pattern: &str, event_name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some("") => true,
        Some(prefix) => event_name.starts_with(prefix),
        None => event_name == pattern,
    }
}

/// Response from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello {
        version: String,
    },
    Error {
        message: String,
    },
    /// The requested entity does not exist (CLI exit code 2)
    NotFound {
        message: String,
    },
    Status {
        report: StatusReport,
    },
    TaskSubmitted {
        id: String,
    },
    Task {
        task: TaskDetail,
    },
    Agents {
        agents: Vec<AgentEntry>,
    },
    WorkflowDefined {
        id: String,
    },
    ExecutionStarted {
        id: String,
    },
    Execution {
        execution: ExecutionDetail,
    },
    Health {
        status: String,
        components: HashMap<String, String>,
    },
    Metrics {
        text: String,
    },
    /// One streamed lifecycle event (EventsSubscribe)
    Event {
        event: Event,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Response::NotFound {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
