// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_adapters::{CommitDelay, FakeSessionAdapter};
use fleet_bus::{KvStore, MessageBus};
use fleet_core::test_support::two_agent_roster;
use fleet_core::workflow::{StepTemplate, WorkflowSpec};
use fleet_core::{AgentRecord, FakeClock, SequentialIdGen, TaskCommand, TaskConfig};
use fleet_engine::{MetricsRegistry, WorkflowEngine};

type TestContext = ApiContext<FakeSessionAdapter, FakeClock, SequentialIdGen>;

fn context() -> (TestContext, FakeSessionAdapter) {
    let roster = two_agent_roster();
    let store = KvStore::new();
    for entry in &roster.agents {
        store.put_agent(AgentRecord::new(entry.id.clone(), entry.session_name()));
    }
    let bus = MessageBus::new(store);
    let clock = FakeClock::at(1_000_000);
    let queue = Arc::new(TaskQueue::new(
        bus,
        clock.clone(),
        SequentialIdGen::new("t"),
        MetricsRegistry::new(),
        fleet_engine::queue::QueueConfig::default(),
    ));
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&queue),
        clock,
        SequentialIdGen::new("w"),
        roster.clone(),
    ));

    let adapter = FakeSessionAdapter::new();
    for entry in &roster.agents {
        adapter.add_session(&entry.session_name());
    }
    let (shutdown_tx, _) = watch::channel(false);

    let ctx = ApiContext {
        queue,
        engine,
        collector: HealthCollector::new(),
        breakers: BreakerRegistry::new(),
        driver: SessionDriver::new(adapter.clone(), CommitDelay::default()),
        roster,
        start_time: Instant::now(),
        shutdown_tx: Arc::new(shutdown_tx),
        restart_bulkhead: Bulkhead::new("session-restarts", 2, 4),
    };
    (ctx, adapter)
}

fn shell_submit(agent: &str) -> Request {
    Request::TaskSubmit {
        config: TaskConfig::new(
            "job",
            agent,
            TaskCommand::Shell {
                line: "echo hi".to_string(),
            },
        ),
    }
}

#[tokio::test]
async fn ping_pongs() {
    let (ctx, _) = context();
    assert_eq!(handle_request(&ctx, Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn hello_reports_version() {
    let (ctx, _) = context();
    let response = handle_request(
        &ctx,
        Request::Hello {
            version: "0.0.1".to_string(),
        },
    )
    .await;
    assert_eq!(
        response,
        Response::Hello {
            version: PROTOCOL_VERSION.to_string()
        }
    );
}

#[tokio::test]
async fn submit_then_status_roundtrip() {
    let (ctx, _) = context();

    let submitted = handle_request(&ctx, shell_submit("backend")).await;
    let Response::TaskSubmitted { id } = submitted else {
        panic!("unexpected response {:?}", submitted);
    };

    let status = handle_request(&ctx, Request::TaskStatus { id: id.clone() }).await;
    let Response::Task { task } = status else {
        panic!("unexpected response {:?}", status);
    };
    assert_eq!(task.id, id);
    assert_eq!(task.state, "scheduled");
    assert_eq!(task.agent, "backend");
}

#[tokio::test]
async fn submit_unknown_agent_is_an_error() {
    let (ctx, _) = context();
    let response = handle_request(&ctx, shell_submit("database")).await;
    assert!(matches!(response, Response::Error { .. }));
}

#[tokio::test]
async fn status_of_unknown_task_is_not_found() {
    let (ctx, _) = context();
    let response = handle_request(
        &ctx,
        Request::TaskStatus {
            id: "ghost".to_string(),
        },
    )
    .await;
    assert!(matches!(response, Response::NotFound { .. }));
}

#[tokio::test]
async fn cancel_unknown_task_is_not_found() {
    let (ctx, _) = context();
    let response = handle_request(
        &ctx,
        Request::TaskCancel {
            id: "ghost".to_string(),
        },
    )
    .await;
    assert!(matches!(response, Response::NotFound { .. }));
}

#[tokio::test]
async fn cancel_accepted_task_returns_ok() {
    let (ctx, _) = context();
    let Response::TaskSubmitted { id } = handle_request(&ctx, shell_submit("backend")).await
    else {
        panic!("submit failed");
    };
    let response = handle_request(&ctx, Request::TaskCancel { id }).await;
    assert_eq!(response, Response::Ok);
}

#[tokio::test]
async fn agent_list_shows_roster() {
    let (ctx, _) = context();
    let Response::Agents { agents } = handle_request(&ctx, Request::AgentList).await else {
        panic!("unexpected response");
    };
    let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["backend", "frontend"]);
}

#[tokio::test]
async fn agent_restart_recreates_session() {
    let (ctx, adapter) = context();
    let response = handle_request(
        &ctx,
        Request::AgentRestart {
            id: "backend".to_string(),
        },
    )
    .await;
    assert_eq!(response, Response::Ok);

    let calls = adapter.calls();
    assert!(calls
        .iter()
        .any(|c| matches!(c, fleet_adapters::SessionCall::Kill { name } if name == "fleet-backend")));
    assert!(calls
        .iter()
        .any(|c| matches!(c, fleet_adapters::SessionCall::Create { name, .. } if name == "fleet-backend")));
}

#[tokio::test]
async fn agent_restart_unknown_is_not_found() {
    let (ctx, _) = context();
    let response = handle_request(
        &ctx,
        Request::AgentRestart {
            id: "database".to_string(),
        },
    )
    .await;
    assert!(matches!(response, Response::NotFound { .. }));
}

fn single_step_spec() -> WorkflowSpec {
    WorkflowSpec {
        name: "wf".to_string(),
        steps: vec![StepTemplate {
            id: "s1".to_string(),
            name: None,
            agent: fleet_core::AgentId::new("backend"),
            action: "shell".to_string(),
            params: [("line".to_string(), "echo hi".to_string())].into(),
            depends_on: vec![],
            timeout_seconds: 300,
            retry_on_failure: false,
            max_retries: 2,
        }],
    }
}

#[tokio::test]
async fn workflow_define_execute_status() {
    let (ctx, _) = context();

    let Response::WorkflowDefined { id } =
        handle_request(&ctx, Request::WorkflowDefine { spec: single_step_spec() }).await
    else {
        panic!("define failed");
    };

    let Response::ExecutionStarted { id: exec_id } = handle_request(
        &ctx,
        Request::WorkflowExecute {
            workflow_id: id,
            params: Default::default(),
        },
    )
    .await
    else {
        panic!("execute failed");
    };

    let Response::Execution { execution } = handle_request(
        &ctx,
        Request::WorkflowStatus {
            execution_id: exec_id.clone(),
        },
    )
    .await
    else {
        panic!("status failed");
    };
    assert_eq!(execution.id, exec_id);
    assert_eq!(execution.steps.len(), 1);
}

#[tokio::test]
async fn workflow_with_cycle_is_rejected() {
    let (ctx, _) = context();
    let mut spec = single_step_spec();
    spec.steps[0].depends_on = vec!["s1".to_string()];

    let response = handle_request(&ctx, Request::WorkflowDefine { spec }).await;
    assert!(matches!(response, Response::Error { .. }));
}

#[tokio::test]
async fn execute_unknown_workflow_is_not_found() {
    let (ctx, _) = context();
    let response = handle_request(
        &ctx,
        Request::WorkflowExecute {
            workflow_id: "ghost".to_string(),
            params: Default::default(),
        },
    )
    .await;
    assert!(matches!(response, Response::NotFound { .. }));
}

#[tokio::test]
async fn status_reports_queue_shape() {
    let (ctx, _) = context();
    handle_request(&ctx, shell_submit("backend")).await;
    handle_request(&ctx, shell_submit("backend")).await;

    let Response::Status { report } = handle_request(&ctx, Request::Status).await else {
        panic!("unexpected response");
    };
    assert_eq!(report.version, PROTOCOL_VERSION);
    assert_eq!(report.queues, vec![QueueDepthEntry {
        agent: "backend".to_string(),
        depth: 2,
    }]);
    assert_eq!(report.processing, 0);
    assert_eq!(report.agents.len(), 2);
}

#[tokio::test]
async fn metrics_render_as_text() {
    let (ctx, _) = context();
    handle_request(&ctx, shell_submit("backend")).await;

    let Response::Metrics { text } = handle_request(&ctx, Request::Metrics).await else {
        panic!("unexpected response");
    };
    assert!(text.contains("tasks_submitted 1"));
}

#[tokio::test]
async fn health_reports_components() {
    let (ctx, _) = context();
    ctx.collector
        .register(Arc::new(fleet_engine::FnHealthCheck::new("queue", || {
            fleet_engine::health::ComponentHealth::healthy("ok")
        })));
    ctx.collector.run_once().await;

    let Response::Health { status, components } = handle_request(&ctx, Request::Health).await
    else {
        panic!("unexpected response");
    };
    assert_eq!(status, "healthy");
    assert_eq!(components["queue"], "healthy: ok");
}
