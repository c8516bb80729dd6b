// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent records and the static roster.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for an agent (one long-lived worker process).
    pub struct AgentId;
}

/// Agent availability as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Error,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live record for one agent.
///
/// Single-writer rule: the owning bridge's heartbeat and the bus's
/// status-transition helpers are the only mutators. `last_heartbeat_ms` is
/// monotone per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    /// Terminal multiplexer session this agent lives in
    pub session_name: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,
    #[serde(default)]
    pub last_heartbeat_ms: u64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Outstanding tasks assigned to this agent
    #[serde(default)]
    pub load: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AgentRecord {
    pub fn new(id: AgentId, session_name: impl Into<String>) -> Self {
        Self {
            id,
            session_name: session_name.into(),
            status: AgentStatus::Idle,
            current_task_id: None,
            last_heartbeat_ms: 0,
            capabilities: Vec::new(),
            load: 0,
            error_message: None,
        }
    }

    /// Record a heartbeat. Older timestamps are ignored (monotone).
    ///
    /// Returns true if the heartbeat advanced the record.
    pub fn observe_heartbeat(&mut self, epoch_ms: u64) -> bool {
        if epoch_ms < self.last_heartbeat_ms {
            return false;
        }
        self.last_heartbeat_ms = epoch_ms;
        if self.status == AgentStatus::Offline {
            self.status = AgentStatus::Idle;
        }
        true
    }

    /// Whether the last heartbeat is older than `timeout_ms`.
    pub fn is_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) > timeout_ms
    }

    pub fn set_busy(&mut self, task_id: TaskId) {
        self.status = AgentStatus::Busy;
        self.current_task_id = Some(task_id);
        self.error_message = None;
    }

    pub fn set_idle(&mut self) {
        self.status = AgentStatus::Idle;
        self.current_task_id = None;
        self.error_message = None;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = AgentStatus::Error;
        self.error_message = Some(message.into());
    }
}

/// One roster entry, as declared in `roster.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: AgentId,
    /// Session name; defaults to `fleet-<id>` when omitted
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Command launched when the session is (re)created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl RosterEntry {
    pub fn session_name(&self) -> String {
        self.session
            .clone()
            .unwrap_or_else(|| format!("fleet-{}", self.id))
    }
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse roster: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("roster is empty")]
    Empty,
    #[error("duplicate agent id in roster: {0}")]
    DuplicateId(AgentId),
}

/// The static agent roster, loaded at startup.
///
/// Agents are registered from this file and may be extended at runtime, but
/// never deleted while the orchestrator runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub agents: Vec<RosterEntry>,
}

impl Roster {
    pub fn from_toml_str(s: &str) -> Result<Self, RosterError> {
        let roster: Roster = toml::from_str(s)?;
        roster.validate()?;
        Ok(roster)
    }

    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let text = std::fs::read_to_string(path).map_err(|source| RosterError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), RosterError> {
        if self.agents.is_empty() {
            return Err(RosterError::Empty);
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.agents {
            if !seen.insert(&entry.id) {
                return Err(RosterError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<&RosterEntry> {
        self.agents.iter().find(|e| &e.id == id)
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.iter().map(|e| &e.id)
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
