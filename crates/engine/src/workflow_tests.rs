// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::metrics::MetricsRegistry;
use crate::queue::QueueConfig;
use fleet_bus::KvStore;
use fleet_core::test_support::two_agent_roster;
use fleet_core::workflow::StepState;
use fleet_core::{AgentId, AgentRecord, FakeClock, SequentialIdGen, Task};
use std::time::Duration;

struct Fixture {
    engine: Arc<WorkflowEngine<FakeClock, SequentialIdGen>>,
    queue: Arc<TaskQueue<FakeClock, SequentialIdGen>>,
}

fn fixture() -> Fixture {
    let store = KvStore::new();
    for agent in ["backend", "frontend"] {
        store.put_agent(AgentRecord::new(
            AgentId::new(agent),
            format!("fleet-{}", agent),
        ));
    }
    let bus = fleet_bus::MessageBus::new(store);
    let clock = FakeClock::at(1_000_000);
    let ids = SequentialIdGen::new("w");
    let queue = Arc::new(TaskQueue::new(
        bus,
        clock.clone(),
        SequentialIdGen::new("t"),
        MetricsRegistry::new(),
        QueueConfig::default(),
    ));
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&queue),
        clock,
        ids,
        two_agent_roster(),
    ));
    Fixture { engine, queue }
}

fn step(id: &str, agent: &str, line: &str, deps: &[&str]) -> StepTemplate {
    StepTemplate {
        id: id.to_string(),
        name: None,
        agent: AgentId::new(agent),
        action: "shell".to_string(),
        params: [("line".to_string(), line.to_string())].into(),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        timeout_seconds: 300,
        retry_on_failure: false,
        max_retries: 2,
    }
}

fn spec(steps: Vec<StepTemplate>) -> WorkflowSpec {
    WorkflowSpec {
        name: "test".to_string(),
        steps,
    }
}

async fn wait_for_status(f: &Fixture, id: &ExecutionId, wanted: ExecutionStatus) -> WorkflowExecution {
    for _ in 0..1_000 {
        if let Some(execution) = f.engine.status(id) {
            if execution.status == wanted {
                return execution;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution never reached {:?}", wanted);
}

async fn next_task(f: &Fixture, agent: &str) -> Task {
    let agent = AgentId::new(agent);
    for _ in 0..1_000 {
        if let Some(task) = f.queue.get(&agent, None).await.unwrap() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no task arrived for {}", agent);
}

// --- substitution ---

#[test]
fn substitute_replaces_known_keys() {
    let context = [("name".to_string(), "fleet".to_string())].into();
    let (out, unknown) = substitute("hello ${name}!", &context);
    assert_eq!(out, "hello fleet!");
    assert!(unknown.is_empty());
}

#[test]
fn substitute_keeps_unknown_literal() {
    let context = std::collections::HashMap::new();
    let (out, unknown) = substitute("echo ${missing} twice ${missing}", &context);
    assert_eq!(out, "echo ${missing} twice ${missing}");
    assert_eq!(unknown, vec!["missing".to_string(), "missing".to_string()]);
}

#[test]
fn substitute_handles_multiple_and_unterminated() {
    let context = [
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ]
    .into();
    let (out, _) = substitute("${a}+${b}=${a", &context);
    assert_eq!(out, "1+2=${a");
}

// --- define ---

#[tokio::test]
async fn define_accepts_valid_spec() {
    let f = fixture();
    let id = f
        .engine
        .define(spec(vec![step("s1", "backend", "echo hi", &[])]))
        .unwrap();
    assert!(f.engine.workflow(&id).is_some());
}

#[tokio::test]
async fn define_rejects_cycles() {
    let f = fixture();
    let err = f
        .engine
        .define(spec(vec![
            step("a", "backend", "x", &["b"]),
            step("b", "backend", "x", &["a"]),
        ]))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn define_rejects_self_dependency() {
    let f = fixture();
    let err = f
        .engine
        .define(spec(vec![step("a", "backend", "x", &["a"])]))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn define_rejects_unknown_agent() {
    let f = fixture();
    let err = f
        .engine
        .define(spec(vec![step("a", "database", "x", &[])]))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn define_rejects_missing_payload_param() {
    let f = fixture();
    let mut bad = step("a", "backend", "x", &[]);
    bad.params.clear();
    let err = f.engine.define(spec(vec![bad])).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn execute_unknown_workflow_errors() {
    let f = fixture();
    let err = f
        .engine
        .execute(&WorkflowId::new("ghost"), HashMap::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::WorkflowNotFound(_)));
}

// --- execution ---

#[tokio::test(start_paused = true)]
async fn single_step_workflow_completes() {
    let f = fixture();
    let wf = f
        .engine
        .define(spec(vec![step("s1", "backend", "echo hello", &[])]))
        .unwrap();
    let exec = f.engine.execute(&wf, HashMap::new()).unwrap();

    // the engine submits the step's task at HIGH priority
    let task = next_task(&f, "backend").await;
    assert_eq!(task.priority, fleet_core::Priority::High);
    assert_eq!(
        task.metadata.get("execution_id").map(String::as_str),
        Some(exec.as_str())
    );
    f.queue.complete(&task.id, Some("hello".to_string())).unwrap();

    let done = wait_for_status(&f, &exec, ExecutionStatus::Completed).await;
    assert_eq!(
        done.context.get("step_s1_result").map(String::as_str),
        Some("hello")
    );
    assert_eq!(done.steps["s1"].state, StepState::Completed);
    assert!(done.finished_at_ms.is_some());
}

#[tokio::test(start_paused = true)]
async fn diamond_fans_out_and_joins() {
    let f = fixture();
    let wf = f
        .engine
        .define(spec(vec![
            step("s1", "backend", "one", &[]),
            step("s2", "backend", "two", &["s1"]),
            step("s3", "frontend", "three", &["s1"]),
            step("s4", "backend", "four", &["s2", "s3"]),
        ]))
        .unwrap();
    let exec = f.engine.execute(&wf, HashMap::new()).unwrap();

    let s1 = next_task(&f, "backend").await;
    f.queue.complete(&s1.id, None).unwrap();

    // fan-out: both branches are running simultaneously
    let s2 = next_task(&f, "backend").await;
    let s3 = next_task(&f, "frontend").await;
    {
        let snapshot = f.engine.status(&exec).unwrap();
        assert_eq!(snapshot.steps["s2"].state, StepState::Running);
        assert_eq!(snapshot.steps["s3"].state, StepState::Running);
        // the join is not ready yet
        assert_eq!(snapshot.steps["s4"].state, StepState::Pending);
    }

    f.queue.complete(&s2.id, None).unwrap();
    f.queue.complete(&s3.id, None).unwrap();

    let s4 = next_task(&f, "backend").await;
    f.queue.complete(&s4.id, None).unwrap();

    wait_for_status(&f, &exec, ExecutionStatus::Completed).await;
}

#[tokio::test(start_paused = true)]
async fn step_failure_skips_dependents_and_fails_execution() {
    let f = fixture();
    let wf = f
        .engine
        .define(spec(vec![
            step("s1", "backend", "one", &[]),
            step("s2", "backend", "two", &["s1"]),
            step("s3", "frontend", "three", &["s1"]),
            step("s4", "backend", "four", &["s2", "s3"]),
        ]))
        .unwrap();
    let exec = f.engine.execute(&wf, HashMap::new()).unwrap();

    let s1 = next_task(&f, "backend").await;
    f.queue.complete(&s1.id, None).unwrap();

    let s2 = next_task(&f, "backend").await;
    let s3 = next_task(&f, "frontend").await;
    // steps default to retry_on_failure = false, so one failure is terminal
    f.queue.fail(&s2.id, "boom").unwrap();
    f.queue.complete(&s3.id, None).unwrap();

    let done = wait_for_status(&f, &exec, ExecutionStatus::Failed).await;
    assert_eq!(done.steps["s2"].state, StepState::Failed);
    assert_eq!(done.steps["s3"].state, StepState::Completed);
    assert_eq!(done.steps["s4"].state, StepState::Skipped);
}

#[tokio::test(start_paused = true)]
async fn context_flows_between_steps() {
    let f = fixture();
    let wf = f
        .engine
        .define(spec(vec![
            step("s1", "backend", "emit", &[]),
            step("s2", "backend", "consume ${step_s1_result} for ${tenant}", &["s1"]),
        ]))
        .unwrap();
    let params = [("tenant".to_string(), "acme".to_string())].into();
    let exec = f.engine.execute(&wf, params).unwrap();

    let s1 = next_task(&f, "backend").await;
    f.queue.complete(&s1.id, Some("v42".to_string())).unwrap();

    let s2 = next_task(&f, "backend").await;
    match &s2.command {
        fleet_core::TaskCommand::Shell { line } => {
            assert_eq!(line, "consume v42 for acme");
        }
        other => panic!("unexpected command {:?}", other),
    }
    f.queue.complete(&s2.id, None).unwrap();
    wait_for_status(&f, &exec, ExecutionStatus::Completed).await;
}

#[tokio::test(start_paused = true)]
async fn unknown_placeholder_warns_and_stays_literal() {
    let f = fixture();
    let wf = f
        .engine
        .define(spec(vec![step("s1", "backend", "echo ${nope}", &[])]))
        .unwrap();

    let mut events = f.queue.bus().subscribe_events();
    let exec = f.engine.execute(&wf, HashMap::new()).unwrap();

    let s1 = next_task(&f, "backend").await;
    match &s1.command {
        fleet_core::TaskCommand::Shell { line } => assert_eq!(line, "echo ${nope}"),
        other => panic!("unexpected command {:?}", other),
    }
    f.queue.complete(&s1.id, None).unwrap();
    wait_for_status(&f, &exec, ExecutionStatus::Completed).await;

    let mut warned = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::WorkflowStepWarning { .. }) {
            warned = true;
        }
    }
    assert!(warned);
}

#[tokio::test(start_paused = true)]
async fn cancel_skips_remaining_steps_and_cancels_tasks() {
    let f = fixture();
    let wf = f
        .engine
        .define(spec(vec![
            step("s1", "backend", "one", &[]),
            step("s2", "backend", "two", &["s1"]),
        ]))
        .unwrap();
    let exec = f.engine.execute(&wf, HashMap::new()).unwrap();

    let s1 = next_task(&f, "backend").await;
    f.engine.cancel(&exec).unwrap();

    let done = wait_for_status(&f, &exec, ExecutionStatus::Cancelled).await;
    assert_eq!(done.steps["s1"].state, StepState::Skipped);
    assert_eq!(done.steps["s2"].state, StepState::Skipped);

    // the in-flight step task was cancelled with the execution
    assert_eq!(
        f.queue.bus().get_task_status(&s1.id).unwrap().state,
        fleet_core::TaskState::Cancelled
    );
}

#[tokio::test(start_paused = true)]
async fn rerun_produces_independent_execution() {
    let f = fixture();
    let wf = f
        .engine
        .define(spec(vec![step("s1", "backend", "echo ${run}", &[])]))
        .unwrap();

    let first = f
        .engine
        .execute(&wf, [("run".to_string(), "1".to_string())].into())
        .unwrap();
    let t1 = next_task(&f, "backend").await;
    f.queue.complete(&t1.id, Some("one".to_string())).unwrap();
    wait_for_status(&f, &first, ExecutionStatus::Completed).await;

    let second = f
        .engine
        .execute(&wf, [("run".to_string(), "2".to_string())].into())
        .unwrap();
    assert_ne!(first, second);

    let t2 = next_task(&f, "backend").await;
    match &t2.command {
        fleet_core::TaskCommand::Shell { line } => assert_eq!(line, "echo 2"),
        other => panic!("unexpected command {:?}", other),
    }
    f.queue.complete(&t2.id, Some("two".to_string())).unwrap();
    let done = wait_for_status(&f, &second, ExecutionStatus::Completed).await;

    // no cross-contamination of contexts
    assert_eq!(
        done.context.get("step_s1_result").map(String::as_str),
        Some("two")
    );
    assert_eq!(
        f.engine
            .status(&first)
            .unwrap()
            .context
            .get("step_s1_result")
            .map(String::as_str),
        Some("one")
    );
}
