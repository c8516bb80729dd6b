// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTO structs for the IPC protocol.

use std::collections::HashMap;

use fleet_core::{AgentRecord, Task, WorkflowExecution};
use serde::{Deserialize, Serialize};

/// Task snapshot for status queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDetail {
    pub id: String,
    pub name: String,
    pub agent: String,
    pub state: String,
    pub priority: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl From<&Task> for TaskDetail {
    fn from(t: &Task) -> Self {
        TaskDetail {
            id: t.id.to_string(),
            name: t.name.clone(),
            agent: t.agent.to_string(),
            state: t.state.to_string(),
            priority: t.priority.to_string(),
            retry_count: t.retry_count,
            max_retries: t.max_retries,
            created_at_ms: t.created_at_ms,
            started_at_ms: t.started_at_ms,
            completed_at_ms: t.completed_at_ms,
            result: t.result.clone(),
            error: t.error.clone(),
            dependencies: t.dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Agent record for listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEntry {
    pub id: String,
    pub session: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    pub last_heartbeat_ms: u64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub load: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&AgentRecord> for AgentEntry {
    fn from(r: &AgentRecord) -> Self {
        AgentEntry {
            id: r.id.to_string(),
            session: r.session_name.clone(),
            status: r.status.to_string(),
            current_task_id: r.current_task_id.as_ref().map(|t| t.to_string()),
            last_heartbeat_ms: r.last_heartbeat_ms,
            capabilities: r.capabilities.clone(),
            load: r.load,
            error_message: r.error_message.clone(),
        }
    }
}

/// One step of an execution for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepEntry {
    pub id: String,
    pub agent: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execution snapshot for status queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionDetail {
    pub id: String,
    pub workflow_id: String,
    pub status: String,
    pub steps: Vec<StepEntry>,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl From<&WorkflowExecution> for ExecutionDetail {
    fn from(e: &WorkflowExecution) -> Self {
        ExecutionDetail {
            id: e.id.to_string(),
            workflow_id: e.workflow_id.to_string(),
            status: e.status.to_string(),
            steps: e
                .steps
                .iter()
                .map(|(id, inst)| StepEntry {
                    id: id.clone(),
                    agent: inst.template.agent.to_string(),
                    state: inst.state.to_string(),
                    task_id: inst.task_id.as_ref().map(|t| t.to_string()),
                    result: inst.result.clone(),
                    error: inst.error.clone(),
                })
                .collect(),
            context: e.context.clone(),
        }
    }
}

/// Per-agent ready-queue depth
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueDepthEntry {
    pub agent: String,
    pub depth: usize,
}

/// Daemon status summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub version: String,
    pub uptime_ms: u64,
    pub health: String,
    pub agents: Vec<AgentEntry>,
    pub queues: Vec<QueueDepthEntry>,
    pub processing: usize,
    pub delayed: usize,
    /// (scope, state) pairs for every circuit breaker
    #[serde(default)]
    pub breakers: Vec<(String, String)>,
}
