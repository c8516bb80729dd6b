// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value sidecar for task and agent records.
//!
//! The logical key layout mirrors an external store (`task:<id>`,
//! `agent:<id>`, `metrics:<name>`) so the same surface could be backed by a
//! remote database later; a single orchestrator keeps it in process.
//!
//! Task state changes go through [`KvStore::transition_task`], a
//! compare-and-swap keyed on task id: the state machine is re-checked under
//! the lock, so replayed or racing transitions fail cleanly instead of
//! corrupting the record.

use fleet_core::task::InvalidTransition;
use fleet_core::{AgentId, AgentRecord, Task, TaskId, TaskState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Terminal FAILED records are kept for 7 days regardless of task TTL.
pub const FAILED_RETENTION_MS: u64 = 7 * 24 * 3600 * 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, Task>,
    agents: HashMap<AgentId, AgentRecord>,
    metrics: HashMap<String, f64>,
}

/// In-process key-value store with single-writer record discipline.
///
/// Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct KvStore {
    inner: Arc<Mutex<StoreState>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- tasks ---

    pub fn put_task(&self, task: Task) {
        self.inner.lock().tasks.insert(task.id.clone(), task);
    }

    /// Snapshot of one task record.
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(id).cloned()
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.inner.lock().tasks.contains_key(id)
    }

    /// Apply a state transition under the store lock (compare-and-swap).
    ///
    /// Returns the updated snapshot. The previous state is re-validated
    /// inside the lock, so concurrent callers cannot double-apply.
    pub fn transition_task(
        &self,
        id: &TaskId,
        to: TaskState,
        epoch_ms: u64,
    ) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
        task.transition(to, epoch_ms)?;
        Ok(task.clone())
    }

    /// Mutate a task record in place; returns the closure result.
    ///
    /// For non-state fields only (result, error, retry_count); state changes
    /// must go through [`Self::transition_task`].
    pub fn update_task<R>(&self, id: &TaskId, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        self.inner.lock().tasks.get_mut(id).map(f)
    }

    pub fn remove_task(&self, id: &TaskId) -> Option<Task> {
        self.inner.lock().tasks.remove(id)
    }

    /// Snapshot of all task records. Bounded by TTL eviction.
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().tasks.values().cloned().collect()
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Evict terminal records past their retention window.
    ///
    /// Completed/Cancelled/Skipped tasks expire `ttl_seconds` after their
    /// terminal timestamp; Failed tasks are kept [`FAILED_RETENTION_MS`].
    pub fn purge_expired(&self, now_ms: u64) -> Vec<TaskId> {
        let mut inner = self.inner.lock();
        let expired: Vec<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.is_terminal())
            .filter(|t| {
                let Some(done) = t.completed_at_ms else {
                    return false;
                };
                let retention_ms = if t.state == TaskState::Failed {
                    FAILED_RETENTION_MS
                } else {
                    t.ttl_seconds * 1000
                };
                now_ms.saturating_sub(done) > retention_ms
            })
            .map(|t| t.id.clone())
            .collect();

        for id in &expired {
            inner.tasks.remove(id);
        }
        expired
    }

    // --- agents ---

    pub fn put_agent(&self, record: AgentRecord) {
        self.inner.lock().agents.insert(record.id.clone(), record);
    }

    pub fn agent(&self, id: &AgentId) -> Option<AgentRecord> {
        self.inner.lock().agents.get(id).cloned()
    }

    pub fn agents(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self.inner.lock().agents.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn update_agent<R>(
        &self,
        id: &AgentId,
        f: impl FnOnce(&mut AgentRecord) -> R,
    ) -> Result<R, StoreError> {
        self.inner
            .lock()
            .agents
            .get_mut(id)
            .map(f)
            .ok_or_else(|| StoreError::AgentNotFound(id.clone()))
    }

    // --- metrics ---

    pub fn set_metric(&self, name: &str, value: f64) {
        self.inner.lock().metrics.insert(name.to_string(), value);
    }

    pub fn incr_metric(&self, name: &str, delta: f64) -> f64 {
        let mut inner = self.inner.lock();
        let entry = inner.metrics.entry(name.to_string()).or_insert(0.0);
        *entry += delta;
        *entry
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.inner.lock().metrics.get(name).copied()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
