// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events published on the `events:*` fanout channel.

use crate::agent::{AgentId, AgentStatus};
use crate::task::{Task, TaskId, TaskState};
use crate::workflow::{ExecutionId, WorkflowId};
use serde::{Deserialize, Serialize};

/// Events emitted by the queue, bridges, and workflow engine.
///
/// Serializes with `{"type": "scope:name", ...fields}` format. Unknown type
/// tags deserialize to `Custom` so journal replay survives version skew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- task --
    /// Carries the full record so journal replay can rebuild the store.
    #[serde(rename = "task:submitted")]
    TaskSubmitted { task: Task },

    #[serde(rename = "task:scheduled")]
    TaskScheduled { id: TaskId, agent: AgentId },

    #[serde(rename = "task:started")]
    TaskStarted { id: TaskId, agent: AgentId },

    #[serde(rename = "task:completed")]
    TaskCompleted {
        id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },

    #[serde(rename = "task:failed")]
    TaskFailed {
        id: TaskId,
        error: String,
        /// True when the agent's pane output violated the sentinel contract
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        protocol_violation: bool,
    },

    #[serde(rename = "task:retrying")]
    TaskRetrying {
        id: TaskId,
        retry_count: u32,
        visible_at_ms: u64,
    },

    #[serde(rename = "task:cancelled")]
    TaskCancelled { id: TaskId },

    #[serde(rename = "task:skipped")]
    TaskSkipped {
        id: TaskId,
        /// The dependency whose failure or cancellation caused the skip
        dependency: TaskId,
    },

    // -- agent --
    #[serde(rename = "agent:heartbeat")]
    AgentHeartbeat {
        id: AgentId,
        status: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_task_id: Option<TaskId>,
        at_ms: u64,
    },

    #[serde(rename = "agent:status_changed")]
    AgentStatusChanged {
        id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },

    #[serde(rename = "agent:offline")]
    AgentOffline {
        id: AgentId,
        last_heartbeat_ms: u64,
    },

    #[serde(rename = "agent:registered")]
    AgentRegistered { id: AgentId, session_name: String },

    // -- workflow --
    #[serde(rename = "workflow:defined")]
    WorkflowDefined {
        id: WorkflowId,
        name: String,
        steps: usize,
    },

    #[serde(rename = "workflow:started")]
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
    },

    #[serde(rename = "workflow:step_started")]
    WorkflowStepStarted {
        execution_id: ExecutionId,
        step: String,
        task_id: TaskId,
    },

    #[serde(rename = "workflow:step_completed")]
    WorkflowStepCompleted {
        execution_id: ExecutionId,
        step: String,
    },

    #[serde(rename = "workflow:step_failed")]
    WorkflowStepFailed {
        execution_id: ExecutionId,
        step: String,
        error: String,
    },

    #[serde(rename = "workflow:step_skipped")]
    WorkflowStepSkipped {
        execution_id: ExecutionId,
        step: String,
    },

    /// Non-fatal problem preparing a step (e.g. an unresolved placeholder)
    #[serde(rename = "workflow:step_warning")]
    WorkflowStepWarning {
        execution_id: ExecutionId,
        step: String,
        message: String,
    },

    #[serde(rename = "workflow:completed")]
    WorkflowCompleted { execution_id: ExecutionId },

    #[serde(rename = "workflow:failed")]
    WorkflowFailed { execution_id: ExecutionId },

    #[serde(rename = "workflow:cancelled")]
    WorkflowCancelled { execution_id: ExecutionId },

    // -- breaker --
    #[serde(rename = "breaker:state_changed")]
    BreakerStateChanged { scope: String, state: String },

    // -- system --
    #[serde(rename = "system:shutdown")]
    Shutdown,

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::TaskSubmitted { .. } => "task:submitted",
            Event::TaskScheduled { .. } => "task:scheduled",
            Event::TaskStarted { .. } => "task:started",
            Event::TaskCompleted { .. } => "task:completed",
            Event::TaskFailed { .. } => "task:failed",
            Event::TaskRetrying { .. } => "task:retrying",
            Event::TaskCancelled { .. } => "task:cancelled",
            Event::TaskSkipped { .. } => "task:skipped",
            Event::AgentHeartbeat { .. } => "agent:heartbeat",
            Event::AgentStatusChanged { .. } => "agent:status_changed",
            Event::AgentOffline { .. } => "agent:offline",
            Event::AgentRegistered { .. } => "agent:registered",
            Event::WorkflowDefined { .. } => "workflow:defined",
            Event::WorkflowStarted { .. } => "workflow:started",
            Event::WorkflowStepStarted { .. } => "workflow:step_started",
            Event::WorkflowStepCompleted { .. } => "workflow:step_completed",
            Event::WorkflowStepFailed { .. } => "workflow:step_failed",
            Event::WorkflowStepSkipped { .. } => "workflow:step_skipped",
            Event::WorkflowStepWarning { .. } => "workflow:step_warning",
            Event::WorkflowCompleted { .. } => "workflow:completed",
            Event::WorkflowFailed { .. } => "workflow:failed",
            Event::WorkflowCancelled { .. } => "workflow:cancelled",
            Event::BreakerStateChanged { .. } => "breaker:state_changed",
            Event::Shutdown => "system:shutdown",
            Event::Custom => "custom",
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::TaskSubmitted { task } => format!(
                "{t} id={} agent={} priority={}",
                task.id, task.agent, task.priority
            ),
            Event::TaskScheduled { id, agent } => format!("{t} id={id} agent={agent}"),
            Event::TaskStarted { id, agent } => format!("{t} id={id} agent={agent}"),
            Event::TaskCompleted { id, .. } => format!("{t} id={id}"),
            Event::TaskFailed { id, error, .. } => format!("{t} id={id} error={error}"),
            Event::TaskRetrying {
                id, retry_count, ..
            } => format!("{t} id={id} retry={retry_count}"),
            Event::TaskCancelled { id } => format!("{t} id={id}"),
            Event::TaskSkipped { id, dependency } => format!("{t} id={id} dep={dependency}"),
            Event::AgentHeartbeat { id, status, .. } => format!("{t} agent={id} status={status}"),
            Event::AgentStatusChanged { id, from, to } => {
                format!("{t} agent={id} {from}->{to}")
            }
            Event::AgentOffline { id, .. } => format!("{t} agent={id}"),
            Event::AgentRegistered { id, session_name } => {
                format!("{t} agent={id} session={session_name}")
            }
            Event::WorkflowDefined { id, name, steps } => {
                format!("{t} id={id} name={name} steps={steps}")
            }
            Event::WorkflowStarted {
                execution_id,
                workflow_id,
            } => format!("{t} exec={execution_id} workflow={workflow_id}"),
            Event::WorkflowStepStarted {
                execution_id,
                step,
                task_id,
            } => format!("{t} exec={execution_id} step={step} task={task_id}"),
            Event::WorkflowStepCompleted { execution_id, step }
            | Event::WorkflowStepSkipped { execution_id, step } => {
                format!("{t} exec={execution_id} step={step}")
            }
            Event::WorkflowStepFailed {
                execution_id,
                step,
                error,
            } => format!("{t} exec={execution_id} step={step} error={error}"),
            Event::WorkflowStepWarning {
                execution_id,
                step,
                message,
            } => format!("{t} exec={execution_id} step={step} msg={message}"),
            Event::WorkflowCompleted { execution_id }
            | Event::WorkflowFailed { execution_id }
            | Event::WorkflowCancelled { execution_id } => format!("{t} exec={execution_id}"),
            Event::BreakerStateChanged { scope, state } => {
                format!("{t} scope={scope} state={state}")
            }
            Event::Shutdown | Event::Custom => t.to_string(),
        }
    }

    /// Task id carried by this event, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskSubmitted { task } => Some(&task.id),
            Event::TaskScheduled { id, .. }
            | Event::TaskStarted { id, .. }
            | Event::TaskCompleted { id, .. }
            | Event::TaskFailed { id, .. }
            | Event::TaskRetrying { id, .. }
            | Event::TaskCancelled { id }
            | Event::TaskSkipped { id, .. } => Some(id),
            Event::WorkflowStepStarted { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// The terminal task event for the given outcome.
    pub fn terminal_for(id: TaskId, state: TaskState, detail: Option<String>) -> Option<Event> {
        match state {
            TaskState::Completed => Some(Event::TaskCompleted { id, result: detail }),
            TaskState::Failed => Some(Event::TaskFailed {
                id,
                error: detail.unwrap_or_default(),
                protocol_violation: false,
            }),
            TaskState::Cancelled => Some(Event::TaskCancelled { id }),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
