// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery: rebuild task and agent records by replaying the journal.
//!
//! Replay is idempotent: every transition goes through the store's
//! compare-and-swap, so entries that no longer apply (or apply twice) are
//! dropped instead of corrupting records. The queue's own structures are
//! rebuilt afterwards from the recovered records via `TaskQueue::recover`.

use fleet_bus::{Journal, JournalError, KvStore};
use fleet_core::{Clock, Event, TaskState};

/// Replay all journal entries into the store.
///
/// Returns the number of entries applied.
pub fn replay_journal(
    store: &KvStore,
    journal: &mut Journal,
    clock: &impl Clock,
) -> Result<usize, JournalError> {
    let entries = journal.entries_after(0)?;
    let now = clock.epoch_ms();
    let mut applied = 0;

    for entry in &entries {
        if apply(store, &entry.event, now) {
            applied += 1;
        }
    }

    tracing::info!(
        entries = entries.len(),
        applied,
        "journal replay finished"
    );
    Ok(applied)
}

/// Apply one replayed event to the store. Returns false when skipped.
fn apply(store: &KvStore, event: &Event, now: u64) -> bool {
    match event {
        Event::TaskSubmitted { task } => {
            store.put_task(task.clone());
            true
        }
        Event::TaskScheduled { id, .. } => {
            // a retry re-enters through Pending first
            if store.task(id).is_some_and(|t| t.state == TaskState::Retrying) {
                let _ = store.transition_task(id, TaskState::Pending, now);
            }
            store.transition_task(id, TaskState::Scheduled, now).is_ok()
        }
        Event::TaskStarted { id, .. } => store.transition_task(id, TaskState::Running, now).is_ok(),
        Event::TaskRetrying {
            id, retry_count, ..
        } => {
            store.update_task(id, |t| t.retry_count = *retry_count);
            store.transition_task(id, TaskState::Retrying, now).is_ok()
        }
        Event::TaskCompleted { id, result } => {
            store.update_task(id, |t| t.result = result.clone());
            store.transition_task(id, TaskState::Completed, now).is_ok()
        }
        Event::TaskFailed { id, error, .. } => {
            store.update_task(id, |t| t.error = Some(error.clone()));
            store.transition_task(id, TaskState::Failed, now).is_ok()
        }
        Event::TaskCancelled { id } => store.transition_task(id, TaskState::Cancelled, now).is_ok(),
        Event::TaskSkipped { id, .. } => store.transition_task(id, TaskState::Skipped, now).is_ok(),
        Event::AgentHeartbeat { id, at_ms, .. } => store
            .update_agent(id, |record| record.observe_heartbeat(*at_ms))
            .unwrap_or(false),
        // workflow executions are not replayed: a restarted orchestrator
        // reports interrupted executions as failed rather than resuming them
        _ => false,
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
