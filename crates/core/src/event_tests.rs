// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::TaskState;

#[test]
fn serializes_with_type_tag() {
    let event = Event::TaskCompleted {
        id: TaskId::new("t-1"),
        result: Some("hello".to_string()),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "task:completed");
    assert_eq!(json["id"], "t-1");
    assert_eq!(json["result"], "hello");
}

#[test]
fn roundtrips_task_failed() {
    let event = Event::TaskFailed {
        id: TaskId::new("t-2"),
        error: "timeout after 300s".to_string(),
        protocol_violation: false,
    };
    let json = serde_json::to_string(&event).unwrap();
    // default false is omitted on the wire
    assert!(!json.contains("protocol_violation"));
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn roundtrips_protocol_violation_flag() {
    let event = Event::TaskFailed {
        id: TaskId::new("t-3"),
        error: "interleaved ids".to_string(),
        protocol_violation: true,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn unknown_type_tag_deserializes_to_custom() {
    let json = r#"{"type": "comet:sighted", "id": "x"}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    assert_eq!(event, Event::Custom);
}

#[test]
fn name_matches_serde_tag() {
    let event = Event::AgentHeartbeat {
        id: AgentId::new("backend"),
        status: AgentStatus::Idle,
        current_task_id: None,
        at_ms: 42,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], event.name());
}

#[test]
fn log_summary_includes_ids() {
    let event = Event::TaskRetrying {
        id: TaskId::new("t-4"),
        retry_count: 2,
        visible_at_ms: 9_000,
    };
    let summary = event.log_summary();
    assert!(summary.contains("task:retrying"));
    assert!(summary.contains("id=t-4"));
    assert!(summary.contains("retry=2"));
}

#[test]
fn task_id_extraction() {
    let event = Event::TaskCancelled {
        id: TaskId::new("t-5"),
    };
    assert_eq!(event.task_id().map(|t| t.as_str()), Some("t-5"));
    assert_eq!(Event::Shutdown.task_id(), None);
}

#[test]
fn terminal_for_maps_outcomes() {
    let done = Event::terminal_for(TaskId::new("a"), TaskState::Completed, None).unwrap();
    assert_eq!(done.name(), "task:completed");

    let failed =
        Event::terminal_for(TaskId::new("b"), TaskState::Failed, Some("oops".into())).unwrap();
    assert_eq!(failed.name(), "task:failed");

    assert!(Event::terminal_for(TaskId::new("c"), TaskState::Running, None).is_none());
}

#[test]
fn workflow_events_roundtrip() {
    let event = Event::WorkflowStepStarted {
        execution_id: ExecutionId::new("exec-1"),
        step: "s2".to_string(),
        task_id: TaskId::new("t-6"),
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
    assert_eq!(back.task_id().map(|t| t.as_str()), Some("t-6"));
}
