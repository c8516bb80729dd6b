// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::test_support::shell_task;
use fleet_core::{AgentId, AgentRecord, FakeClock, TaskId};
use tempfile::tempdir;

fn journaled(events: &[Event]) -> (tempfile::TempDir, Journal) {
    let dir = tempdir().unwrap();
    let mut journal = Journal::open(&dir.path().join("events.jsonl")).unwrap();
    for event in events {
        journal.append(event).unwrap();
    }
    journal.flush().unwrap();
    (dir, journal)
}

#[test]
fn replay_rebuilds_a_completed_task() {
    let task = shell_task("t-1", "backend", "echo hi", 1_000);
    let id = task.id.clone();
    let (_dir, mut journal) = journaled(&[
        Event::TaskSubmitted { task },
        Event::TaskScheduled {
            id: id.clone(),
            agent: AgentId::new("backend"),
        },
        Event::TaskStarted {
            id: id.clone(),
            agent: AgentId::new("backend"),
        },
        Event::TaskCompleted {
            id: id.clone(),
            result: Some("hi".to_string()),
        },
    ]);

    let store = KvStore::new();
    let applied = replay_journal(&store, &mut journal, &FakeClock::at(9_000)).unwrap();
    assert_eq!(applied, 4);

    let recovered = store.task(&id).unwrap();
    assert_eq!(recovered.state, TaskState::Completed);
    assert_eq!(recovered.result.as_deref(), Some("hi"));
}

#[test]
fn replay_leaves_interrupted_task_running() {
    let task = shell_task("t-1", "backend", "echo hi", 1_000);
    let id = task.id.clone();
    let (_dir, mut journal) = journaled(&[
        Event::TaskSubmitted { task },
        Event::TaskScheduled {
            id: id.clone(),
            agent: AgentId::new("backend"),
        },
        Event::TaskStarted {
            id: id.clone(),
            agent: AgentId::new("backend"),
        },
    ]);

    let store = KvStore::new();
    replay_journal(&store, &mut journal, &FakeClock::at(9_000)).unwrap();

    // the queue's recover() turns this into a retried attempt
    assert_eq!(store.task(&id).unwrap().state, TaskState::Running);
}

#[test]
fn replay_applies_retry_counts() {
    let task = shell_task("t-1", "backend", "flaky", 1_000);
    let id = task.id.clone();
    let agent = AgentId::new("backend");
    let (_dir, mut journal) = journaled(&[
        Event::TaskSubmitted { task },
        Event::TaskScheduled {
            id: id.clone(),
            agent: agent.clone(),
        },
        Event::TaskStarted {
            id: id.clone(),
            agent: agent.clone(),
        },
        Event::TaskRetrying {
            id: id.clone(),
            retry_count: 1,
            visible_at_ms: 5_000,
        },
        Event::TaskScheduled {
            id: id.clone(),
            agent: agent.clone(),
        },
        Event::TaskStarted {
            id: id.clone(),
            agent,
        },
        Event::TaskFailed {
            id: id.clone(),
            error: "boom".to_string(),
            protocol_violation: false,
        },
    ]);

    let store = KvStore::new();
    replay_journal(&store, &mut journal, &FakeClock::at(9_000)).unwrap();

    let recovered = store.task(&id).unwrap();
    assert_eq!(recovered.state, TaskState::Failed);
    assert_eq!(recovered.retry_count, 1);
    assert_eq!(recovered.error.as_deref(), Some("boom"));
}

#[test]
fn replay_is_idempotent() {
    let task = shell_task("t-1", "backend", "x", 1_000);
    let id = task.id.clone();
    let (_dir, mut journal) = journaled(&[
        Event::TaskSubmitted { task },
        Event::TaskScheduled {
            id: id.clone(),
            agent: AgentId::new("backend"),
        },
    ]);

    let store = KvStore::new();
    replay_journal(&store, &mut journal, &FakeClock::at(9_000)).unwrap();
    // a second replay over the same store drops the stale transitions
    replay_journal(&store, &mut journal, &FakeClock::at(9_500)).unwrap();

    assert_eq!(store.task(&id).unwrap().state, TaskState::Scheduled);
}

#[test]
fn replay_restores_heartbeats_for_known_agents() {
    let agent = AgentId::new("backend");
    let (_dir, mut journal) = journaled(&[Event::AgentHeartbeat {
        id: agent.clone(),
        status: fleet_core::AgentStatus::Idle,
        current_task_id: None,
        at_ms: 7_000,
    }]);

    let store = KvStore::new();
    store.put_agent(AgentRecord::new(agent.clone(), "fleet-backend"));
    replay_journal(&store, &mut journal, &FakeClock::at(9_000)).unwrap();

    assert_eq!(store.agent(&agent).unwrap().last_heartbeat_ms, 7_000);
}

#[test]
fn replay_ignores_events_for_unknown_tasks() {
    let (_dir, mut journal) = journaled(&[Event::TaskCancelled {
        id: TaskId::new("ghost"),
    }]);

    let store = KvStore::new();
    let applied = replay_journal(&store, &mut journal, &FakeClock::at(9_000)).unwrap();
    assert_eq!(applied, 0);
}
