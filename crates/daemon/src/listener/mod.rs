// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket listener: the API adapter.
//!
//! Translates protocol requests into bus/queue/workflow operations. Only
//! fatal outcomes cross this boundary; transient errors were already
//! absorbed by the layers below.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use fleet_adapters::{SessionAdapter, SessionDriver};
use fleet_engine::breaker::{BreakerRegistry, Bulkhead};
use fleet_engine::health::HealthCollector;
use fleet_engine::{EngineError, TaskQueue, WorkflowEngine};
use fleet_core::{AgentId, AgentStatus, Clock, ExecutionId, IdGen, Roster, TaskId, WorkflowId};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::protocol::wire::{self, ProtocolError, DEFAULT_TIMEOUT};
use crate::protocol::{
    AgentEntry, ExecutionDetail, QueueDepthEntry, Request, Response, StatusReport, TaskDetail,
    PROTOCOL_VERSION,
};

/// Everything a connection handler needs, cheap to clone per connection.
pub struct ApiContext<A: SessionAdapter, C: Clock, G: IdGen> {
    pub queue: Arc<TaskQueue<C, G>>,
    pub engine: Arc<WorkflowEngine<C, G>>,
    pub collector: HealthCollector,
    pub breakers: BreakerRegistry,
    pub driver: SessionDriver<A>,
    pub roster: Roster,
    pub start_time: Instant,
    pub shutdown_tx: Arc<watch::Sender<bool>>,
    /// Bounds concurrent session restarts (kill + recreate is slow)
    pub restart_bulkhead: Bulkhead,
}

impl<A: SessionAdapter, C: Clock, G: IdGen> Clone for ApiContext<A, C, G> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            engine: Arc::clone(&self.engine),
            collector: self.collector.clone(),
            breakers: self.breakers.clone(),
            driver: self.driver.clone(),
            roster: self.roster.clone(),
            start_time: self.start_time,
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            restart_bulkhead: self.restart_bulkhead.clone(),
        }
    }
}

/// Accept connections until shutdown.
pub async fn run<A: SessionAdapter, C: Clock, G: IdGen>(
    listener: UnixListener,
    ctx: ApiContext<A, C, G>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("listener started");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let ctx = ctx.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, ctx, shutdown).await {
                                debug!(error = %e, "connection ended");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("listener stopped");
}

async fn handle_connection<S, A, C, G>(
    stream: S,
    ctx: ApiContext<A, C, G>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    A: SessionAdapter,
    C: Clock,
    G: IdGen,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    loop {
        let bytes = tokio::select! {
            read = wire::read_message(&mut reader) => read?,
            _ = shutdown.changed() => return Ok(()),
        };
        let request: Request = wire::decode(&bytes)?;
        debug!(?request, "request");

        match request {
            Request::EventsSubscribe { pattern } => {
                return stream_events(&mut writer, &ctx, pattern, shutdown).await;
            }
            Request::Shutdown => {
                wire::write_response(&mut writer, &Response::Ok, DEFAULT_TIMEOUT).await?;
                let _ = ctx.shutdown_tx.send(true);
                return Ok(());
            }
            request => {
                let response = handle_request(&ctx, request).await;
                wire::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
            }
        }
    }
}

/// Forward bus events matching the pattern until the client hangs up.
async fn stream_events<W, A, C, G>(
    writer: &mut W,
    ctx: &ApiContext<A, C, G>,
    pattern: Option<String>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ProtocolError>
where
    W: AsyncWriteExt + Unpin,
    A: SessionAdapter,
    C: Clock,
    G: IdGen,
{
    let mut events = ctx.queue.bus().subscribe_events();
    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        if let Some(pattern) = &pattern {
                            if !crate::protocol::pattern_matches(pattern, event.name()) {
                                continue;
                            }
                        }
                        let frame = Response::Event { event };
                        wire::write_response(writer, &frame, DEFAULT_TIMEOUT).await?;
                    }
                    // skipped events on lag; subscribers resync from records
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
            _ = shutdown.changed() => return Ok(()),
        }
    }
}

/// The API adapter proper: one request in, one response out.
pub async fn handle_request<A, C, G>(ctx: &ApiContext<A, C, G>, request: Request) -> Response
where
    A: SessionAdapter,
    C: Clock,
    G: IdGen,
{
    match request {
        Request::Ping => Response::Pong,
        Request::Hello { version } => {
            if version != PROTOCOL_VERSION {
                debug!(client = %version, daemon = PROTOCOL_VERSION, "version skew");
            }
            Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            }
        }
        Request::Status => status_report(ctx),
        Request::Shutdown | Request::EventsSubscribe { .. } => {
            // handled at the connection layer
            Response::error("request not valid in this context")
        }

        Request::TaskSubmit { config } => match ctx.queue.submit(config) {
            Ok(id) => Response::TaskSubmitted { id: id.to_string() },
            Err(e) => engine_error_response(e),
        },
        Request::TaskStatus { id } => {
            match ctx.queue.bus().get_task_status(&TaskId::new(&id)) {
                Some(task) => Response::Task {
                    task: TaskDetail::from(&task),
                },
                None => Response::not_found(format!("task not found: {}", id)),
            }
        }
        Request::TaskCancel { id } => match ctx.queue.cancel(&TaskId::new(&id)) {
            Ok(()) => Response::Ok,
            Err(e) => engine_error_response(e),
        },

        Request::AgentList => Response::Agents {
            agents: ctx
                .queue
                .bus()
                .store()
                .agents()
                .iter()
                .map(AgentEntry::from)
                .collect(),
        },
        Request::AgentRestart { id } => restart_agent(ctx, &id).await,

        Request::WorkflowDefine { spec } => match ctx.engine.define(spec) {
            Ok(id) => Response::WorkflowDefined { id: id.to_string() },
            Err(e) => engine_error_response(e),
        },
        Request::WorkflowExecute {
            workflow_id,
            params,
        } => match ctx.engine.execute(&WorkflowId::new(workflow_id), params) {
            Ok(id) => Response::ExecutionStarted { id: id.to_string() },
            Err(e) => engine_error_response(e),
        },
        Request::WorkflowStatus { execution_id } => {
            match ctx.engine.status(&ExecutionId::new(&execution_id)) {
                Some(execution) => Response::Execution {
                    execution: ExecutionDetail::from(&execution),
                },
                None => Response::not_found(format!("execution not found: {}", execution_id)),
            }
        }
        Request::WorkflowCancel { execution_id } => {
            match ctx.engine.cancel(&ExecutionId::new(&execution_id)) {
                Ok(()) => Response::Ok,
                Err(e) => engine_error_response(e),
            }
        }

        Request::Health => {
            let (status, components) = ctx.collector.report();
            Response::Health {
                status: status.to_string(),
                components: components
                    .into_iter()
                    .map(|(name, health)| {
                        (name, format!("{}: {}", health.status, health.message))
                    })
                    .collect::<HashMap<_, _>>(),
            }
        }
        Request::Metrics => Response::Metrics {
            text: ctx.queue.metrics().render_text(),
        },
    }
}

fn status_report<A, C, G>(ctx: &ApiContext<A, C, G>) -> Response
where
    A: SessionAdapter,
    C: Clock,
    G: IdGen,
{
    let agents: Vec<AgentEntry> = ctx
        .queue
        .bus()
        .store()
        .agents()
        .iter()
        .map(AgentEntry::from)
        .collect();
    let queues = ctx
        .queue
        .depths()
        .into_iter()
        .map(|(agent, depth)| QueueDepthEntry {
            agent: agent.to_string(),
            depth,
        })
        .collect();
    let breakers = ctx
        .breakers
        .states()
        .into_iter()
        .map(|(scope, state)| (scope, state.as_str().to_string()))
        .collect();

    Response::Status {
        report: StatusReport {
            version: PROTOCOL_VERSION.to_string(),
            uptime_ms: ctx.start_time.elapsed().as_millis() as u64,
            health: ctx.collector.report().0.to_string(),
            agents,
            queues,
            processing: ctx.queue.processing_count(),
            delayed: ctx.queue.delayed_count(),
            breakers,
        },
    }
}

/// Kill and recreate an agent's session, then reset its record.
async fn restart_agent<A, C, G>(ctx: &ApiContext<A, C, G>, id: &str) -> Response
where
    A: SessionAdapter,
    C: Clock,
    G: IdGen,
{
    let agent_id = AgentId::new(id);
    let Some(entry) = ctx.roster.get(&agent_id) else {
        return Response::not_found(format!("agent not found: {}", id));
    };

    let session = entry.session_name();
    let restarted = ctx
        .restart_bulkhead
        .execute(ctx.driver.restart_session(&session, entry.command.as_deref()))
        .await;
    match restarted {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Response::error(format!("session restart failed: {}", e)),
        Err(e) => return Response::error(e.to_string()),
    }

    if let Err(e) = ctx
        .queue
        .bus()
        .update_agent_status(&agent_id, AgentStatus::Idle, None)
    {
        return Response::error(format!("status reset failed: {}", e));
    }
    info!(agent = %agent_id, session = %session, "agent restarted");
    Response::Ok
}

fn engine_error_response(e: EngineError) -> Response {
    match e {
        EngineError::TaskNotFound(_)
        | EngineError::WorkflowNotFound(_)
        | EngineError::ExecutionNotFound(_) => Response::not_found(e.to_string()),
        other => Response::error(other.to_string()),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
