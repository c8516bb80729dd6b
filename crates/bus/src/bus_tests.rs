// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::test_support::shell_task;
use tempfile::tempdir;

fn bus() -> MessageBus {
    MessageBus::new(KvStore::new())
}

fn bus_with_agent(id: &str) -> MessageBus {
    let bus = bus();
    bus.store()
        .put_agent(AgentRecord::new(AgentId::new(id), format!("fleet-{}", id)));
    bus
}

// --- events:* fanout ---

#[tokio::test]
async fn every_subscriber_sees_every_event() {
    let bus = bus();
    let mut rx1 = bus.subscribe_events();
    let mut rx2 = bus.subscribe_events();

    bus.broadcast_event(Event::Shutdown);

    assert_eq!(rx1.recv().await.unwrap(), Event::Shutdown);
    assert_eq!(rx2.recv().await.unwrap(), Event::Shutdown);
}

#[tokio::test]
async fn events_preserve_fifo_order() {
    let bus = bus();
    let mut rx = bus.subscribe_events();

    for n in 0..5 {
        bus.broadcast_event(Event::TaskCancelled {
            id: TaskId::new(format!("t-{}", n)),
        });
    }

    for n in 0..5 {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id().map(|t| t.to_string()), Some(format!("t-{}", n)));
    }
}

// --- results:<task> ---

#[tokio::test]
async fn result_delivered_to_waiting_subscriber() {
    let bus = bus();
    let id = TaskId::new("t-1");
    let waiter = bus.subscribe_result(&id);

    bus.publish_result(TaskResult::completed(id.clone(), Some("ok".into())))
        .unwrap();

    let result = waiter.wait().await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.result.as_deref(), Some("ok"));
}

#[tokio::test]
async fn late_subscriber_sees_sticky_result() {
    let bus = bus();
    let id = TaskId::new("t-1");

    bus.publish_result(TaskResult::failed(id.clone(), "boom"))
        .unwrap();

    let result = bus.subscribe_result(&id).wait().await.unwrap();
    assert_eq!(result.state, TaskState::Failed);
    assert_eq!(result.error.as_deref(), Some("boom"));
}

#[test]
fn duplicate_result_is_idempotent() {
    let bus = bus();
    let id = TaskId::new("t-1");
    let result = TaskResult::completed(id.clone(), Some("r".into()));

    bus.publish_result(result.clone()).unwrap();
    bus.publish_result(result.clone()).unwrap();
    assert_eq!(bus.result_of(&id), Some(result));
}

#[test]
fn conflicting_result_is_rejected() {
    let bus = bus();
    let id = TaskId::new("t-1");

    bus.publish_result(TaskResult::completed(id.clone(), Some("a".into())))
        .unwrap();
    let err = bus.publish_result(TaskResult::completed(id.clone(), Some("b".into())));
    assert!(matches!(err, Err(BusError::ConflictingResult(_))));
}

#[test]
fn forget_result_clears_slot() {
    let bus = bus();
    let id = TaskId::new("t-1");
    bus.publish_result(TaskResult::cancelled(id.clone())).unwrap();
    bus.forget_result(&id);
    assert_eq!(bus.result_of(&id), None);
}

// --- agent records ---

#[tokio::test]
async fn heartbeat_updates_record_and_broadcasts() {
    let bus = bus_with_agent("backend");
    let mut rx = bus.subscribe_events();
    let id = AgentId::new("backend");

    bus.heartbeat(&id, AgentStatus::Idle, None, 5_000).unwrap();

    let record = bus.get_agent_status(&id).unwrap();
    assert_eq!(record.last_heartbeat_ms, 5_000);

    let event = rx.recv().await.unwrap();
    assert!(matches!(event, Event::AgentHeartbeat { at_ms: 5_000, .. }));
}

#[test]
fn stale_heartbeat_is_dropped() {
    let bus = bus_with_agent("backend");
    let id = AgentId::new("backend");

    bus.heartbeat(&id, AgentStatus::Idle, None, 5_000).unwrap();
    bus.heartbeat(&id, AgentStatus::Idle, None, 4_000).unwrap();

    assert_eq!(bus.get_agent_status(&id).unwrap().last_heartbeat_ms, 5_000);
}

#[tokio::test]
async fn status_change_emits_event_once() {
    let bus = bus_with_agent("backend");
    let mut rx = bus.subscribe_events();
    let id = AgentId::new("backend");

    bus.update_agent_status(&id, AgentStatus::Error, Some("driver failed".into()))
        .unwrap();
    // same status again: no second event
    bus.update_agent_status(&id, AgentStatus::Error, Some("driver failed".into()))
        .unwrap();
    bus.broadcast_event(Event::Shutdown);

    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::AgentStatusChanged {
            to: AgentStatus::Error,
            ..
        }
    ));
    assert_eq!(rx.recv().await.unwrap(), Event::Shutdown);
}

#[test]
fn set_agent_busy_records_task() {
    let bus = bus_with_agent("backend");
    let id = AgentId::new("backend");

    bus.set_agent_busy(&id, TaskId::new("t-9")).unwrap();
    let record = bus.get_agent_status(&id).unwrap();
    assert_eq!(record.status, AgentStatus::Busy);
    assert_eq!(record.current_task_id, Some(TaskId::new("t-9")));
}

#[test]
fn sweep_offline_marks_stale_agents() {
    let bus = bus_with_agent("backend");
    let id = AgentId::new("backend");
    bus.heartbeat(&id, AgentStatus::Idle, None, 1_000).unwrap();

    // within the window: untouched
    assert!(bus.sweep_offline(20_000, 30_000).is_empty());

    let offline = bus.sweep_offline(40_000, 30_000);
    assert_eq!(offline, vec![id.clone()]);
    assert_eq!(bus.get_agent_status(&id).unwrap().status, AgentStatus::Offline);

    // a fresh heartbeat revives it
    bus.heartbeat(&id, AgentStatus::Idle, None, 50_000).unwrap();
    assert_eq!(bus.get_agent_status(&id).unwrap().status, AgentStatus::Idle);
}

// --- journal integration ---

#[test]
fn journaled_events_replay_after_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.jsonl");

    {
        let journal = Journal::open(&path).unwrap();
        let bus = MessageBus::with_journal(KvStore::new(), journal);
        bus.broadcast_event(Event::TaskCancelled {
            id: TaskId::new("t-1"),
        });
        bus.flush_journal().unwrap();
    }

    let mut journal = Journal::open(&path).unwrap();
    let entries = journal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].event,
        Event::TaskCancelled {
            id: TaskId::new("t-1")
        }
    );
}

#[tokio::test]
async fn publish_task_stores_record_and_announces() {
    let bus = bus();
    let mut rx = bus.subscribe_events();
    let task = shell_task("t-1", "backend", "echo", 0);

    let id = bus.publish_task(task);

    assert!(bus.get_task_status(&id).is_some());
    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::TaskSubmitted { .. }
    ));
}

// --- store passthrough ---

#[test]
fn task_status_reads_store() {
    let bus = bus();
    let task = shell_task("t-1", "backend", "echo", 0);
    let id = task.id.clone();
    bus.store().put_task(task);
    assert!(bus.get_task_status(&id).is_some());
}
