// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::{FakeSessionAdapter, SessionCall};
use yare::parameterized;

fn driver(adapter: FakeSessionAdapter) -> SessionDriver<FakeSessionAdapter> {
    SessionDriver::new(adapter, CommitDelay::default())
}

// --- CommitDelay validation ---

#[parameterized(
    zero = { 0.0 },
    tiny = { 0.05 },
    negative = { -1.0 },
    nan = { f64::NAN },
)]
fn commit_delay_rejects(seconds: f64) {
    assert!(CommitDelay::from_seconds(seconds).is_err());
}

#[parameterized(
    minimum = { 0.1 },
    half_second = { 0.5 },
    two_seconds = { 2.0 },
)]
fn commit_delay_accepts(seconds: f64) {
    let delay = CommitDelay::from_seconds(seconds).unwrap();
    assert_eq!(delay.as_duration(), Duration::from_secs_f64(seconds));
}

#[test]
fn commit_delay_default_is_minimum() {
    assert_eq!(CommitDelay::default().as_duration(), MIN_COMMIT_DELAY);
}

// --- send_command discipline ---

#[tokio::test(start_paused = true)]
async fn send_command_writes_literal_then_enter() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("fleet-backend");

    driver(adapter.clone())
        .send_command("fleet-backend", "echo hello")
        .await
        .unwrap();

    let calls = adapter.calls();
    assert_eq!(
        calls,
        vec![
            SessionCall::SendLiteral {
                name: "fleet-backend".to_string(),
                text: "echo hello".to_string(),
            },
            SessionCall::SendKey {
                name: "fleet-backend".to_string(),
                key: "Enter".to_string(),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn send_command_pauses_at_least_commit_delay() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s");

    let delay = CommitDelay::from_seconds(0.25).unwrap();
    SessionDriver::new(adapter.clone(), delay)
        .send_command("s", "ls")
        .await
        .unwrap();

    let timed = adapter.timed_calls();
    assert_eq!(timed.len(), 2);
    let elapsed = timed[1].at.duration_since(timed[0].at);
    assert!(
        elapsed >= Duration::from_millis(250),
        "commit pause was only {:?}",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn send_command_fails_fast_on_missing_session() {
    let adapter = FakeSessionAdapter::new();

    let err = driver(adapter.clone())
        .send_command("ghost", "ls")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));

    // the commit key is never sent when the payload write failed
    assert_eq!(adapter.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_keys_is_a_single_write() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s");

    driver(adapter.clone()).send_keys("s", "C-c").await.unwrap();

    assert_eq!(
        adapter.calls(),
        vec![SessionCall::SendKey {
            name: "s".to_string(),
            key: "C-c".to_string(),
        }]
    );
}

// --- session lifecycle ---

#[tokio::test(start_paused = true)]
async fn create_then_exists_then_kill() {
    let adapter = FakeSessionAdapter::new();
    let driver = driver(adapter.clone());

    driver.create_session("s", Some("claude")).await.unwrap();
    assert!(driver.session_exists("s").await.unwrap());

    driver.kill_session("s").await.unwrap();
    assert!(!driver.session_exists("s").await.unwrap());

    let session = adapter.get_session("s").unwrap();
    assert_eq!(session.initial_command.as_deref(), Some("claude"));
}

#[tokio::test(start_paused = true)]
async fn restart_recreates_session() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s");
    let driver = driver(adapter.clone());

    driver.restart_session("s", Some("claude")).await.unwrap();

    assert!(driver.session_exists("s").await.unwrap());
    let calls = adapter.calls();
    assert!(matches!(calls[0], SessionCall::Kill { .. }));
    assert!(matches!(calls[1], SessionCall::Create { .. }));
}

#[tokio::test(start_paused = true)]
async fn capture_pane_respects_line_limit() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s");
    adapter.set_output("s", vec!["one".into(), "two".into(), "three".into()]);

    let text = driver(adapter).capture_pane("s", Some(2)).await.unwrap();
    assert_eq!(text, "two\nthree");
}

#[tokio::test(start_paused = true)]
async fn probe_uses_list() {
    let adapter = FakeSessionAdapter::new();
    driver(adapter.clone()).probe().await.unwrap();
    assert_eq!(adapter.calls(), vec![SessionCall::List]);
}
