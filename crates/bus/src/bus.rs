// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-process message bus.
//!
//! Channel semantics:
//! - `events:*` is a true fanout: every active subscriber sees every event,
//!   in publication order (at-least-once; subscribers must be idempotent).
//! - `results:<task>` is directed delivery with a sticky terminal value, so
//!   a subscriber arriving after completion still observes the result.
//!
//! Events are journaled before subscribers are notified, which is what makes
//! replay-based crash recovery possible.

use crate::journal::{Journal, JournalError};
use crate::store::{KvStore, StoreError};
use fleet_core::{AgentId, AgentRecord, AgentStatus, Event, Task, TaskId, TaskState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the events fanout channel. Slow subscribers observe `Lagged`
/// and resynchronize from the store.
const EVENTS_CAPACITY: usize = 1024;

/// Capacity of each per-task result channel. One terminal message ever flows.
const RESULT_CAPACITY: usize = 4;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("conflicting result for task {0}")]
    ConflictingResult(TaskId),
    #[error("result channel closed for task {0}")]
    ResultChannelClosed(TaskId),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The single terminal message on `results:<task>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn completed(task_id: TaskId, result: Option<String>) -> Self {
        Self {
            task_id,
            state: TaskState::Completed,
            result,
            error: None,
        }
    }

    pub fn failed(task_id: TaskId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            state: TaskState::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn cancelled(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Cancelled,
            result: None,
            error: None,
        }
    }

    pub fn skipped(task_id: TaskId, dependency: &TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Skipped,
            result: None,
            error: Some(format!("dependency {} did not complete", dependency)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Completed
    }
}

struct ResultSlot {
    tx: broadcast::Sender<TaskResult>,
    terminal: Option<TaskResult>,
}

impl ResultSlot {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(RESULT_CAPACITY);
        Self { tx, terminal: None }
    }
}

/// Awaits the terminal result of one task.
pub struct ResultWaiter {
    task_id: TaskId,
    sticky: Option<TaskResult>,
    rx: broadcast::Receiver<TaskResult>,
}

impl ResultWaiter {
    /// Wait for the task's terminal result.
    ///
    /// Resolves immediately if the result was already published.
    pub async fn wait(mut self) -> Result<TaskResult, BusError> {
        if let Some(result) = self.sticky {
            return Ok(result);
        }
        loop {
            match self.rx.recv().await {
                Ok(result) => return Ok(result),
                // only one message ever flows, so lag cannot lose it
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BusError::ResultChannelClosed(self.task_id));
                }
            }
        }
    }
}

/// In-process pub/sub with the key-value sidecar attached.
///
/// Clones share channels, store, and journal.
#[derive(Clone)]
pub struct MessageBus {
    store: KvStore,
    journal: Option<Arc<Mutex<Journal>>>,
    events_tx: broadcast::Sender<Event>,
    results: Arc<Mutex<HashMap<TaskId, ResultSlot>>>,
}

impl MessageBus {
    pub fn new(store: KvStore) -> Self {
        let (events_tx, _) = broadcast::channel(EVENTS_CAPACITY);
        Self {
            store,
            journal: None,
            events_tx,
            results: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach a durable journal: every broadcast event is appended (and
    /// group-committed) before subscribers are notified.
    pub fn with_journal(store: KvStore, journal: Journal) -> Self {
        let mut bus = Self::new(store);
        bus.journal = Some(Arc::new(Mutex::new(journal)));
        bus
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    // --- events:* ---

    /// Publish a lifecycle event to every subscriber.
    pub fn broadcast_event(&self, event: Event) {
        tracing::debug!(event = %event.log_summary(), "bus event");

        if let Some(journal) = &self.journal {
            let mut journal = journal.lock();
            if let Err(e) = journal.append(&event) {
                tracing::error!(error = %e, "journal append failed");
            } else if journal.needs_flush() {
                if let Err(e) = journal.flush() {
                    tracing::error!(error = %e, "journal flush failed");
                }
            }
        }

        // No active subscribers is fine
        let _ = self.events_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Record a newly accepted task and announce it.
    ///
    /// Placement into a ready queue is the queue's concern; the bus only owns
    /// the record and the announcement.
    pub fn publish_task(&self, task: Task) -> TaskId {
        let id = task.id.clone();
        self.store.put_task(task.clone());
        self.broadcast_event(Event::TaskSubmitted { task });
        id
    }

    /// Force buffered journal entries to disk (shutdown path).
    pub fn flush_journal(&self) -> Result<(), BusError> {
        if let Some(journal) = &self.journal {
            journal.lock().flush()?;
        }
        Ok(())
    }

    // --- results:<task> ---

    /// Publish the terminal result for a task.
    ///
    /// Idempotent for an identical outcome; a different outcome for the same
    /// task is rejected, since a terminal state must be published exactly
    /// once.
    pub fn publish_result(&self, result: TaskResult) -> Result<(), BusError> {
        let mut results = self.results.lock();
        let slot = results
            .entry(result.task_id.clone())
            .or_insert_with(ResultSlot::new);

        if let Some(existing) = &slot.terminal {
            if *existing == result {
                return Ok(());
            }
            return Err(BusError::ConflictingResult(result.task_id));
        }

        slot.terminal = Some(result.clone());
        let _ = slot.tx.send(result);
        Ok(())
    }

    /// Subscribe to a task's terminal result.
    pub fn subscribe_result(&self, task_id: &TaskId) -> ResultWaiter {
        let mut results = self.results.lock();
        let slot = results
            .entry(task_id.clone())
            .or_insert_with(ResultSlot::new);
        ResultWaiter {
            task_id: task_id.clone(),
            sticky: slot.terminal.clone(),
            rx: slot.tx.subscribe(),
        }
    }

    /// Sticky terminal result, if published.
    pub fn result_of(&self, task_id: &TaskId) -> Option<TaskResult> {
        self.results
            .lock()
            .get(task_id)
            .and_then(|slot| slot.terminal.clone())
    }

    /// Drop the result slot for an evicted task.
    pub fn forget_result(&self, task_id: &TaskId) {
        self.results.lock().remove(task_id);
    }

    // --- status records ---

    pub fn get_task_status(&self, task_id: &TaskId) -> Option<Task> {
        self.store.task(task_id)
    }

    pub fn get_agent_status(&self, agent_id: &AgentId) -> Option<AgentRecord> {
        self.store.agent(agent_id)
    }

    /// Update an agent's status, emitting a status-change event when it
    /// actually changed.
    pub fn update_agent_status(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        error_message: Option<String>,
    ) -> Result<(), BusError> {
        let changed = self.store.update_agent(agent_id, |record| {
            let from = record.status;
            record.status = status;
            record.error_message = error_message;
            if status != AgentStatus::Busy {
                record.current_task_id = None;
            }
            (from != status).then_some(from)
        })?;

        if let Some(from) = changed {
            self.broadcast_event(Event::AgentStatusChanged {
                id: agent_id.clone(),
                from,
                to: status,
            });
        }
        Ok(())
    }

    /// Mark an agent busy with the given task.
    pub fn set_agent_busy(&self, agent_id: &AgentId, task_id: TaskId) -> Result<(), BusError> {
        let from = self.store.update_agent(agent_id, |record| {
            let from = record.status;
            record.set_busy(task_id.clone());
            from
        })?;

        if from != AgentStatus::Busy {
            self.broadcast_event(Event::AgentStatusChanged {
                id: agent_id.clone(),
                from,
                to: AgentStatus::Busy,
            });
        }
        Ok(())
    }

    /// Record a bridge heartbeat: monotone record update plus fanout event.
    pub fn heartbeat(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        current_task_id: Option<TaskId>,
        at_ms: u64,
    ) -> Result<(), BusError> {
        let advanced = self.store.update_agent(agent_id, |record| {
            let advanced = record.observe_heartbeat(at_ms);
            if advanced {
                record.current_task_id = current_task_id.clone();
            }
            advanced
        })?;

        if advanced {
            self.broadcast_event(Event::AgentHeartbeat {
                id: agent_id.clone(),
                status,
                current_task_id,
                at_ms,
            });
        }
        Ok(())
    }

    /// Mark agents with stale heartbeats OFFLINE.
    ///
    /// Returns the agents transitioned. The queue stops dispatching to
    /// OFFLINE agents until a fresh heartbeat revives them.
    pub fn sweep_offline(&self, now_ms: u64, timeout_ms: u64) -> Vec<AgentId> {
        let stale: Vec<AgentRecord> = self
            .store
            .agents()
            .into_iter()
            .filter(|r| r.status != AgentStatus::Offline && r.is_stale(now_ms, timeout_ms))
            .collect();

        let mut transitioned = Vec::new();
        for record in stale {
            let ok = self
                .store
                .update_agent(&record.id, |r| {
                    // re-check under the lock; a heartbeat may have landed
                    if r.status != AgentStatus::Offline && r.is_stale(now_ms, timeout_ms) {
                        r.status = AgentStatus::Offline;
                        true
                    } else {
                        false
                    }
                })
                .unwrap_or(false);

            if ok {
                self.broadcast_event(Event::AgentOffline {
                    id: record.id.clone(),
                    last_heartbeat_ms: record.last_heartbeat_ms,
                });
                transitioned.push(record.id);
            }
        }
        transitioned
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
