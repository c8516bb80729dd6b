// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn create_records_call_and_session() {
    let adapter = FakeSessionAdapter::new();
    adapter.create("s1", Some("bash")).await.unwrap();

    assert!(adapter.exists("s1").await.unwrap());
    assert_eq!(
        adapter.calls()[0],
        SessionCall::Create {
            name: "s1".to_string(),
            initial_command: Some("bash".to_string()),
        }
    );
}

#[tokio::test]
async fn send_to_unknown_session_errors() {
    let adapter = FakeSessionAdapter::new();
    assert!(matches!(
        adapter.send_literal("nope", "hi").await,
        Err(SessionError::NotFound(_))
    ));
}

#[tokio::test]
async fn capture_returns_scripted_output() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s");
    adapter.append_output("s", &["a", "b"]);

    assert_eq!(adapter.capture("s", None).await.unwrap(), "a\nb");
    assert_eq!(adapter.capture("s", Some(1)).await.unwrap(), "b");
}

#[tokio::test]
async fn kill_marks_dead_but_keeps_history() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s");
    adapter.kill("s").await.unwrap();

    assert!(!adapter.exists("s").await.unwrap());
    assert!(adapter.get_session("s").is_some());
}

#[tokio::test]
async fn failing_mode_fails_sends_and_captures() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s");
    adapter.set_failing(true);

    assert!(adapter.send_literal("s", "x").await.is_err());
    assert!(adapter.capture("s", None).await.is_err());

    adapter.set_failing(false);
    assert!(adapter.send_literal("s", "x").await.is_ok());
}

#[tokio::test]
async fn list_returns_alive_sessions_sorted() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("b");
    adapter.add_session("a");
    adapter.add_session("c");
    adapter.set_alive("c", false);

    assert_eq!(adapter.list().await.unwrap(), vec!["a", "b"]);
}
