// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::test_support::shell_task;
use fleet_core::{AgentRecord, TaskState};

fn store_with_task(id: &str) -> (KvStore, TaskId) {
    let store = KvStore::new();
    let task = shell_task(id, "backend", "echo hi", 1_000);
    let task_id = task.id.clone();
    store.put_task(task);
    (store, task_id)
}

// --- tasks ---

#[test]
fn put_and_get_returns_snapshot() {
    let (store, id) = store_with_task("t-1");
    let snap = store.task(&id).unwrap();
    assert_eq!(snap.state, TaskState::Pending);

    // mutating the snapshot does not touch the store
    let mut snap = snap;
    snap.state = TaskState::Running;
    assert_eq!(store.task(&id).unwrap().state, TaskState::Pending);
}

#[test]
fn transition_task_cas_applies_state_machine() {
    let (store, id) = store_with_task("t-1");

    let task = store.transition_task(&id, TaskState::Scheduled, 2_000).unwrap();
    assert_eq!(task.state, TaskState::Scheduled);
    assert_eq!(task.scheduled_at_ms, Some(2_000));

    // an invalid replay is rejected, record untouched
    let err = store.transition_task(&id, TaskState::Scheduled, 3_000);
    assert!(matches!(err, Err(StoreError::InvalidTransition(_))));
    assert_eq!(store.task(&id).unwrap().scheduled_at_ms, Some(2_000));
}

#[test]
fn transition_unknown_task_errors() {
    let store = KvStore::new();
    assert!(matches!(
        store.transition_task(&TaskId::new("nope"), TaskState::Scheduled, 0),
        Err(StoreError::TaskNotFound(_))
    ));
}

#[test]
fn update_task_mutates_non_state_fields() {
    let (store, id) = store_with_task("t-1");
    store.update_task(&id, |t| t.retry_count = 2);
    assert_eq!(store.task(&id).unwrap().retry_count, 2);
}

// --- TTL eviction ---

fn terminal_task(store: &KvStore, id: &str, state: TaskState, done_ms: u64) -> TaskId {
    let mut task = shell_task(id, "backend", "x", 0);
    task.ttl_seconds = 60;
    let task_id = task.id.clone();
    store.put_task(task);
    store.transition_task(&task_id, TaskState::Scheduled, 0).unwrap();
    store.transition_task(&task_id, TaskState::Running, 0).unwrap();
    match state {
        TaskState::Completed => {
            store.transition_task(&task_id, TaskState::Completed, done_ms).unwrap();
        }
        TaskState::Failed => {
            store.transition_task(&task_id, TaskState::Failed, done_ms).unwrap();
        }
        _ => {}
    }
    task_id
}

#[test]
fn purge_evicts_completed_past_ttl() {
    let store = KvStore::new();
    let old = terminal_task(&store, "old", TaskState::Completed, 0);
    let fresh = terminal_task(&store, "fresh", TaskState::Completed, 100_000);

    let evicted = store.purge_expired(100_000); // ttl 60s: "old" is 100s stale
    assert_eq!(evicted, vec![old.clone()]);
    assert!(store.task(&old).is_none());
    assert!(store.task(&fresh).is_some());
}

#[test]
fn purge_keeps_failed_for_seven_days() {
    let store = KvStore::new();
    let failed = terminal_task(&store, "f", TaskState::Failed, 0);

    // past the task TTL but inside failed retention
    assert!(store.purge_expired(3_600_000).is_empty());

    let evicted = store.purge_expired(FAILED_RETENTION_MS + 1_000);
    assert_eq!(evicted, vec![failed]);
}

#[test]
fn purge_ignores_live_tasks() {
    let (store, id) = store_with_task("t-1");
    assert!(store.purge_expired(u64::MAX).is_empty());
    assert!(store.task(&id).is_some());
}

// --- agents ---

#[test]
fn agents_sorted_by_id() {
    let store = KvStore::new();
    store.put_agent(AgentRecord::new(AgentId::new("zeta"), "s-z"));
    store.put_agent(AgentRecord::new(AgentId::new("alpha"), "s-a"));

    let ids: Vec<String> = store.agents().iter().map(|a| a.id.to_string()).collect();
    assert_eq!(ids, vec!["alpha", "zeta"]);
}

#[test]
fn update_agent_unknown_errors() {
    let store = KvStore::new();
    assert!(matches!(
        store.update_agent(&AgentId::new("ghost"), |_| ()),
        Err(StoreError::AgentNotFound(_))
    ));
}

// --- metrics ---

#[test]
fn metrics_set_and_incr() {
    let store = KvStore::new();
    store.set_metric("queue_depth", 3.0);
    assert_eq!(store.metric("queue_depth"), Some(3.0));

    assert_eq!(store.incr_metric("tasks_submitted", 1.0), 1.0);
    assert_eq!(store.incr_metric("tasks_submitted", 2.0), 3.0);
}
