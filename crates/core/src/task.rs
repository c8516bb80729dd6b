// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier, priority ordering, and state machine.

use crate::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a task.
    ///
    /// Each submitted task gets a unique ID that can be used to track its
    /// state, query its status, and reference it in logs and events.
    #[derive(Default)]
    pub struct TaskId;
}

/// Dispatch priority. Lower value means more urgent.
///
/// The queue orders by `(priority, created_at_ms)`, so two tasks at the same
/// priority dequeue in submission order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl Priority {
    /// All priorities, most urgent first. Used for per-priority gauges.
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "background" => Ok(Priority::Background),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Task lifecycle state.
///
/// ```text
/// Pending ──▶ Scheduled ──▶ Running ──▶ Completed
///    ▲                         │
///    └──── Retrying ◀──────────┼──▶ Failed
///                              └──▶ Cancelled
/// ```
///
/// `Skipped` is entered from any non-terminal state when a dependency fails
/// or is cancelled. Terminal states (`Completed`, `Failed`, `Cancelled`,
/// `Skipped`) admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted, not yet visible to a worker (may be dependency-gated)
    Pending,
    /// Visible in its agent's ready queue
    Scheduled,
    /// Dequeued by a bridge, in flight
    Running,
    /// Failed attempt waiting out its backoff
    Retrying,
    /// Finished successfully (terminal)
    Completed,
    /// Exhausted retries or failed non-retriably (terminal)
    Failed,
    /// Cancelled by the caller (terminal)
    Cancelled,
    /// A dependency failed or was cancelled (terminal)
    Skipped,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled | TaskState::Skipped
        )
    }

    /// Whether the state machine admits `self -> to`.
    pub fn can_transition(&self, to: TaskState) -> bool {
        use TaskState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            // cancel() fires from any non-terminal state
            (_, Cancelled) => true,
            // dependency failure skips anything not yet running
            (Pending | Scheduled | Retrying, Skipped) => true,
            (Pending, Scheduled) => true,
            (Scheduled, Running) => true,
            (Running, Completed | Failed | Retrying) => true,
            (Retrying, Pending) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Scheduled => "scheduled",
            TaskState::Running => "running",
            TaskState::Retrying => "retrying",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} -> {to} for task {task_id}")]
pub struct InvalidTransition {
    pub task_id: TaskId,
    pub from: TaskState,
    pub to: TaskState,
}

/// What a task asks its agent to do.
///
/// The command set is closed: unknown tags are rejected at submit time by
/// serde rather than dispatched as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskCommand {
    /// A shell command typed into the agent's pane.
    Shell { line: String },
    /// Free-form prompt text for an interactive agent. May span lines.
    Prompt { text: String },
}

impl TaskCommand {
    /// Payload lines as delivered to the pane, in order.
    pub fn lines(&self) -> Vec<&str> {
        match self {
            TaskCommand::Shell { line } => line.lines().collect(),
            TaskCommand::Prompt { text } => text.lines().collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskCommand::Shell { .. } => "shell",
            TaskCommand::Prompt { .. } => "prompt",
        }
    }
}

/// Configuration for creating a new task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub agent: AgentId,
    pub command: TaskCommand,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_ttl_seconds() -> u64 {
    86_400
}

impl TaskConfig {
    pub fn new(name: impl Into<String>, agent: impl Into<AgentId>, command: TaskCommand) -> Self {
        Self {
            name: name.into(),
            agent: agent.into(),
            command,
            params: HashMap::new(),
            priority: Priority::Normal,
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            dependencies: Vec::new(),
            metadata: HashMap::new(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

/// A unit of work targeted at exactly one agent.
///
/// Mutated exclusively through the queue (state, retries, timestamps) and the
/// owning bridge (result/error, via the queue API). External readers see
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub agent: AgentId,
    pub command: TaskCommand,
    #[serde(default)]
    pub params: HashMap<String, String>,
    pub priority: Priority,
    pub state: TaskState,
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
    pub timeout_seconds: u64,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub ttl_seconds: u64,
}

impl Task {
    pub fn new(id: TaskId, config: TaskConfig, epoch_ms: u64) -> Self {
        Self {
            id,
            name: config.name,
            agent: config.agent,
            command: config.command,
            params: config.params,
            priority: config.priority,
            state: TaskState::Pending,
            max_retries: config.max_retries,
            retry_count: 0,
            timeout_seconds: config.timeout_seconds,
            created_at_ms: epoch_ms,
            scheduled_at_ms: None,
            started_at_ms: None,
            completed_at_ms: None,
            result: None,
            error: None,
            dependencies: config.dependencies,
            metadata: config.metadata,
            ttl_seconds: config.ttl_seconds,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a state transition, recording the matching timestamp.
    ///
    /// Returns the previous state, or an error if the machine does not admit
    /// the transition. Timestamps: `scheduled_at_ms` on entering Scheduled,
    /// `started_at_ms` on entering Running (overwritten per attempt),
    /// `completed_at_ms` on entering any terminal state.
    pub fn transition(
        &mut self,
        to: TaskState,
        epoch_ms: u64,
    ) -> Result<TaskState, InvalidTransition> {
        if !self.state.can_transition(to) {
            return Err(InvalidTransition {
                task_id: self.id.clone(),
                from: self.state,
                to,
            });
        }
        let from = self.state;
        self.state = to;
        match to {
            TaskState::Scheduled => self.scheduled_at_ms = Some(epoch_ms),
            TaskState::Running => self.started_at_ms = Some(epoch_ms),
            _ if to.is_terminal() => self.completed_at_ms = Some(epoch_ms),
            _ => {}
        }
        Ok(from)
    }

    /// Epoch ms past which a terminal task may be evicted, if terminal.
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.completed_at_ms
            .filter(|_| self.is_terminal())
            .map(|done| done + self.ttl_seconds * 1000)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
