// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent bridge: one per roster agent.
//!
//! Dequeues tasks for its agent, frames them onto the pane with sentinels,
//! polls the pane for the verdict, and reports the outcome to the queue. The
//! bridge never retries a task attempt itself; failures re-enter through the
//! queue's retry path.
//!
//! Task outcomes run under the `agent:<id>` circuit breaker: delivery
//! failures, capture failures, and agent-reported FAILED verdicts all count
//! against it, and only a COMPLETED verdict counts for it. An open breaker
//! pauses dequeuing until its timeout elapses, then a single task is
//! admitted as the probe.

use crate::breaker::CircuitBreaker;
use crate::queue::TaskQueue;
use crate::sentinel::{end_sentinel, parse_pane, start_sentinel, PaneOutcome};
use fleet_adapters::{SessionAdapter, SessionDriver, SessionError};
use fleet_core::{AgentId, AgentStatus, Clock, Event, IdGen, Task};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Bridge cadences.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Pane polling cadence while a task is in flight
    pub poll_interval: Duration,
    /// Heartbeat publication cadence
    pub heartbeat_interval: Duration,
    /// Rows captured per poll
    pub capture_lines: u32,
    /// Blocking dequeue timeout per loop turn
    pub dequeue_wait: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            capture_lines: 100,
            dequeue_wait: Duration::from_secs(1),
        }
    }
}

/// Drives one agent's terminal session.
#[derive(Clone)]
pub struct AgentBridge<A: SessionAdapter, C: Clock, G: IdGen> {
    agent_id: AgentId,
    session: String,
    driver: SessionDriver<A>,
    queue: Arc<TaskQueue<C, G>>,
    clock: C,
    breaker: CircuitBreaker,
    config: BridgeConfig,
}

impl<A: SessionAdapter, C: Clock, G: IdGen> AgentBridge<A, C, G> {
    pub fn new(
        agent_id: AgentId,
        session: impl Into<String>,
        driver: SessionDriver<A>,
        queue: Arc<TaskQueue<C, G>>,
        clock: C,
        breaker: CircuitBreaker,
        config: BridgeConfig,
    ) -> Self {
        Self {
            agent_id,
            session: session.into(),
            driver,
            queue,
            clock,
            breaker,
            config,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The delivery loop: dequeue, deliver, watch, report.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(agent = %self.agent_id, session = %self.session, "bridge started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            if !self.breaker.allow_call(self.clock.epoch_ms()) {
                // breaker open: hold off dequeuing until the probe window;
                // callers see the agent as offline in the meantime
                tracing::debug!(
                    agent = %self.agent_id,
                    error = %crate::error::EngineError::CircuitOpen(self.breaker.name().to_string()),
                    "pausing dequeue"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.config.dequeue_wait) => continue,
                    _ = shutdown.changed() => break,
                }
            }

            let task = tokio::select! {
                got = self.queue.get(&self.agent_id, Some(self.config.dequeue_wait)) => got,
                _ = shutdown.changed() => break,
            };

            match task {
                Ok(Some(task)) => self.handle_task(task, &mut shutdown).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(agent = %self.agent_id, error = %e, "dequeue failed");
                    tokio::time::sleep(self.config.dequeue_wait).await;
                }
            }
        }
        tracing::info!(agent = %self.agent_id, "bridge stopped");
    }

    /// Heartbeat loop, spawned alongside [`Self::run`].
    pub async fn run_heartbeat(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = self.clock.epoch_ms();
            let bus = self.queue.bus();
            let (status, current) = bus
                .get_agent_status(&self.agent_id)
                .map(|r| (r.status, r.current_task_id))
                .unwrap_or((AgentStatus::Idle, None));
            if let Err(e) = bus.heartbeat(&self.agent_id, status, current, now) {
                tracing::error!(agent = %self.agent_id, error = %e, "heartbeat failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn handle_task(&self, task: Task, shutdown: &mut watch::Receiver<bool>) {
        let bus = self.queue.bus();
        if let Err(e) = bus.set_agent_busy(&self.agent_id, task.id.clone()) {
            tracing::error!(agent = %self.agent_id, error = %e, "status update failed");
        }

        match self.deliver(&task).await {
            Ok(()) => {
                // the breaker scores task outcomes, not mere delivery:
                // success is recorded only once a COMPLETED verdict lands
                self.watch_pane(&task, shutdown).await;
            }
            Err(e) => {
                tracing::warn!(agent = %self.agent_id, task = %task.id, error = %e, "delivery failed");
                self.record_breaker(false);
                let _ = bus.update_agent_status(
                    &self.agent_id,
                    AgentStatus::Error,
                    Some(e.to_string()),
                );
                if let Err(fail_err) = self
                    .queue
                    .fail(&task.id, &format!("delivery failed: {}", e))
                {
                    tracing::error!(task = %task.id, error = %fail_err, "fail report failed");
                }
                return;
            }
        }

        let _ = bus.update_agent_status(&self.agent_id, AgentStatus::Idle, None);
    }

    /// Frame the task onto the pane: START sentinel, payload, END sentinel.
    ///
    /// Every line goes through `send_command`, which enforces the commit
    /// delay between the write and the Enter keystroke.
    async fn deliver(&self, task: &Task) -> Result<(), SessionError> {
        self.driver
            .send_command(&self.session, &start_sentinel(task.id.as_str()))
            .await?;
        for line in task.command.lines() {
            self.driver.send_command(&self.session, line).await?;
        }
        self.driver
            .send_command(&self.session, &end_sentinel(task.id.as_str()))
            .await
    }

    /// Poll the pane until the task reaches a verdict or stops being ours.
    async fn watch_pane(&self, task: &Task, shutdown: &mut watch::Receiver<bool>) {
        let bus = self.queue.bus();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => return,
            }

            // cancelled or timed out underneath us: stop watching, discard
            let still_running = bus
                .get_task_status(&task.id)
                .map(|t| t.state == fleet_core::TaskState::Running)
                .unwrap_or(false);
            if !still_running {
                tracing::debug!(task = %task.id, "task no longer running, discarding watch");
                return;
            }

            let pane = match self
                .driver
                .capture_pane(&self.session, Some(self.config.capture_lines))
                .await
            {
                Ok(pane) => pane,
                Err(e) => {
                    tracing::warn!(agent = %self.agent_id, task = %task.id, error = %e, "pane capture failed");
                    self.record_breaker(false);
                    let _ = bus.update_agent_status(
                        &self.agent_id,
                        AgentStatus::Error,
                        Some(e.to_string()),
                    );
                    let _ = self
                        .queue
                        .fail(&task.id, &format!("pane capture failed: {}", e));
                    return;
                }
            };

            match parse_pane(&pane, task.id.as_str()) {
                PaneOutcome::Pending => {}
                PaneOutcome::Completed { result } => {
                    self.record_breaker(true);
                    if let Err(e) = self.queue.complete(&task.id, result) {
                        tracing::error!(task = %task.id, error = %e, "completion report failed");
                    }
                    return;
                }
                PaneOutcome::Failed { error } => {
                    // agent-reported failures count toward opening the breaker
                    self.record_breaker(false);
                    if let Err(e) = self.queue.fail(&task.id, &error) {
                        tracing::error!(task = %task.id, error = %e, "failure report failed");
                    }
                    return;
                }
                PaneOutcome::Interleaved { other_id } => {
                    let message = format!("interleaved output from task {}", other_id);
                    tracing::error!(task = %task.id, other = %other_id, "sentinel contract violated");
                    if let Err(e) = self.queue.fail_protocol(&task.id, &message) {
                        tracing::error!(task = %task.id, error = %e, "protocol-failure report failed");
                    }
                    return;
                }
            }
        }
    }

    fn record_breaker(&self, ok: bool) {
        let now = self.clock.epoch_ms();
        let changed = if ok {
            self.breaker.record_success(now)
        } else {
            self.breaker.record_failure(now)
        };
        if let Some(state) = changed {
            self.queue.bus().broadcast_event(Event::BreakerStateChanged {
                scope: self.breaker.name().to_string(),
                state: state.as_str().to_string(),
            });
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
