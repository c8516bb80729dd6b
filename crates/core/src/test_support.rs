// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and helpers shared by other crates' tests.
#![allow(clippy::unwrap_used)]

use crate::agent::{AgentId, Roster, RosterEntry};
use crate::task::{Priority, Task, TaskCommand, TaskConfig, TaskId};

/// Build a minimal shell task for the given agent.
pub fn shell_task(id: &str, agent: &str, line: &str, epoch_ms: u64) -> Task {
    Task::new(
        TaskId::new(id),
        TaskConfig::new(
            id,
            agent,
            TaskCommand::Shell {
                line: line.to_string(),
            },
        ),
        epoch_ms,
    )
}

/// Build a task with an explicit priority.
pub fn task_with_priority(id: &str, agent: &str, priority: Priority, epoch_ms: u64) -> Task {
    let mut config = TaskConfig::new(
        id,
        agent,
        TaskCommand::Shell {
            line: format!("echo {}", id),
        },
    );
    config.priority = priority;
    Task::new(TaskId::new(id), config, epoch_ms)
}

/// A two-agent roster used across engine and daemon tests.
pub fn two_agent_roster() -> Roster {
    Roster {
        agents: vec![
            RosterEntry {
                id: AgentId::new("backend"),
                session: None,
                capabilities: vec!["api".to_string()],
                command: None,
            },
            RosterEntry {
                id: AgentId::new("frontend"),
                session: Some("fleet-frontend".to_string()),
                capabilities: vec!["ui".to_string()],
                command: None,
            },
        ],
    }
}
