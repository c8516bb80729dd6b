// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The distributed priority queue.
//!
//! Per-agent ready sets are ordered by `(priority, created_at_ms, id)`, so
//! insert, pop-min, and remove-by-id are all O(log n). Dependency-gated and
//! backoff-delayed tasks live in the delayed set until the scheduler (or a
//! dependency resolution) promotes them.
//!
//! All task state changes go through the store's compare-and-swap, keyed on
//! task id: a crashed worker's replayed transition fails cleanly instead of
//! double-applying, and every terminal task publishes exactly one result.

use crate::backoff::retry_backoff;
use crate::error::EngineError;
use crate::metrics::MetricsRegistry;
use fleet_bus::{MessageBus, TaskResult};
use fleet_core::{
    AgentId, AgentStatus, Clock, Event, IdGen, Priority, Task, TaskConfig, TaskId, TaskState,
    UuidIdGen,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Notify;

/// Delayed entries gated on dependencies rather than time.
const NEVER_MS: u64 = u64::MAX;

/// Bound on how many delayed entries one scheduler tick examines.
const PROMOTE_SCAN_LIMIT: usize = 128;

/// Queue ordering key: priority first, then submission time, then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Priority,
    created_at_ms: u64,
    id: TaskId,
}

impl QueueKey {
    fn of(task: &Task) -> Self {
        Self {
            priority: task.priority,
            created_at_ms: task.created_at_ms,
            id: task.id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    agent: AgentId,
    started_at_ms: u64,
    timeout_ms: u64,
}

#[derive(Default)]
struct QueueState {
    /// Per-agent ready sets, priority-ordered
    ready: HashMap<AgentId, BTreeSet<QueueKey>>,
    /// (visible_at_ms, id); dependency-gated entries use NEVER_MS
    delayed: BTreeSet<(u64, TaskId)>,
    /// dep id -> tasks waiting on it
    awaiting: HashMap<TaskId, HashSet<TaskId>>,
    /// tasks handed to a bridge and not yet reported
    in_flight: HashMap<TaskId, InFlight>,
}

/// Queue tuning knobs, from [`crate::env::EngineConfig`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Heartbeat staleness before an agent is considered offline
    pub offline_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            offline_timeout: Duration::from_secs(30),
        }
    }
}

/// The per-agent priority queue with retries, timeouts, and dependencies.
///
/// The queue is the single writer of task state; bridges and the workflow
/// engine only reach task records through these operations.
pub struct TaskQueue<C: Clock, G: IdGen = UuidIdGen> {
    bus: MessageBus,
    clock: C,
    ids: G,
    metrics: MetricsRegistry,
    config: QueueConfig,
    inner: Mutex<QueueState>,
    waiters: Mutex<HashMap<AgentId, std::sync::Arc<Notify>>>,
}

impl<C: Clock, G: IdGen> TaskQueue<C, G> {
    pub fn new(
        bus: MessageBus,
        clock: C,
        ids: G,
        metrics: MetricsRegistry,
        config: QueueConfig,
    ) -> Self {
        Self {
            bus,
            clock,
            ids,
            metrics,
            config,
            inner: Mutex::new(QueueState::default()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    fn waiter(&self, agent: &AgentId) -> std::sync::Arc<Notify> {
        self.waiters
            .lock()
            .entry(agent.clone())
            .or_default()
            .clone()
    }

    // --- submit ---

    /// Validate and accept a task.
    ///
    /// Tasks with unresolved dependencies wait in the delayed set; everything
    /// else becomes visible in its agent's ready queue immediately.
    pub fn submit(&self, config: TaskConfig) -> Result<TaskId, EngineError> {
        let agent_record = self
            .bus
            .get_agent_status(&config.agent)
            .ok_or_else(|| EngineError::Validation(format!("unknown agent: {}", config.agent)))?;

        // resolve dependency states up front
        let mut unsatisfied: Vec<TaskId> = Vec::new();
        let mut doomed_by: Option<TaskId> = None;
        for dep in &config.dependencies {
            let dep_task = self.bus.get_task_status(dep).ok_or_else(|| {
                EngineError::Validation(format!("unknown dependency: {}", dep))
            })?;
            match dep_task.state {
                TaskState::Completed => {}
                s if s.is_terminal() => doomed_by = Some(dep.clone()),
                _ => unsatisfied.push(dep.clone()),
            }
        }

        let id = TaskId::new(self.ids.next());
        let now = self.clock.epoch_ms();
        let task = Task::new(id.clone(), config, now);
        let priority = task.priority;
        self.bus.publish_task(task);

        self.metrics.incr_counter("tasks_submitted", &[], 1);
        tracing::info!(task = %id, agent = %agent_record.id, %priority, "task submitted");
        if agent_record.status == AgentStatus::Offline {
            // accepted anyway; it waits in the queue until the agent recovers
            tracing::info!(
                task = %id,
                error = %EngineError::AgentOffline(agent_record.id.clone()),
                "target agent offline, task will wait"
            );
        }

        if let Some(dep) = doomed_by {
            // a dependency already failed or was cancelled
            self.skip_task(&id, &dep)?;
        } else if unsatisfied.is_empty() {
            self.make_visible(&id)?;
        } else {
            let mut inner = self.inner.lock();
            inner.delayed.insert((NEVER_MS, id.clone()));
            for dep in unsatisfied {
                inner.awaiting.entry(dep).or_default().insert(id.clone());
            }
        }

        Ok(id)
    }

    /// Move a Pending task into its agent's ready set.
    fn make_visible(&self, id: &TaskId) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        let task = self
            .bus
            .store()
            .transition_task(id, TaskState::Scheduled, now)?;

        {
            let mut inner = self.inner.lock();
            inner
                .ready
                .entry(task.agent.clone())
                .or_default()
                .insert(QueueKey::of(&task));
        }

        self.bus.broadcast_event(Event::TaskScheduled {
            id: id.clone(),
            agent: task.agent.clone(),
        });
        self.waiter(&task.agent).notify_waiters();
        Ok(())
    }

    // --- get ---

    /// Whether the queue will dispatch to this agent right now.
    fn agent_dispatchable(&self, agent: &AgentId) -> bool {
        self.bus
            .get_agent_status(agent)
            .map(|r| r.status != AgentStatus::Offline)
            .unwrap_or(false)
    }

    fn try_pop(&self, agent: &AgentId) -> Result<Option<Task>, EngineError> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.ready.get_mut(agent) else {
            return Ok(None);
        };
        let Some(key) = set.pop_first() else {
            return Ok(None);
        };

        let now = self.clock.epoch_ms();
        // a task cancelled between scheduling and pop is simply dropped here
        let task = match self.bus.store().transition_task(&key.id, TaskState::Running, now) {
            Ok(task) => task,
            Err(e) => {
                tracing::debug!(task = %key.id, error = %e, "dequeue lost race, dropping");
                return Ok(None);
            }
        };

        inner.in_flight.insert(
            key.id.clone(),
            InFlight {
                agent: agent.clone(),
                started_at_ms: now,
                timeout_ms: task.timeout_seconds * 1000,
            },
        );
        drop(inner);

        self.metrics.observe_histogram(
            "queue_wait_seconds",
            &[("agent", agent.as_str())],
            (now.saturating_sub(task.created_at_ms)) as f64 / 1000.0,
        );
        self.bus.broadcast_event(Event::TaskStarted {
            id: task.id.clone(),
            agent: agent.clone(),
        });
        Ok(Some(task))
    }

    /// Dequeue the highest-priority ready task for an agent.
    ///
    /// With a timeout the call blocks until a task arrives or the timeout
    /// elapses; without one it returns immediately. OFFLINE agents are never
    /// dispatched to.
    pub async fn get(
        &self,
        agent: &AgentId,
        timeout: Option<Duration>,
    ) -> Result<Option<Task>, EngineError> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            if self.agent_dispatchable(agent) {
                if let Some(task) = self.try_pop(agent)? {
                    return Ok(Some(task));
                }
            }

            let Some(deadline) = deadline else {
                return Ok(None);
            };
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }

            let notify = self.waiter(agent);
            let _ = tokio::time::timeout_at(deadline, notify.notified()).await;

            if tokio::time::Instant::now() >= deadline {
                // one last non-blocking look before giving up
                if self.agent_dispatchable(agent) {
                    if let Some(task) = self.try_pop(agent)? {
                        return Ok(Some(task));
                    }
                }
                return Ok(None);
            }
        }
    }

    // --- complete / fail / cancel ---

    /// Report a successful task.
    ///
    /// Idempotent when repeated with the same result; a different result for
    /// an already-completed task is a protocol violation. Reports against
    /// tasks that were cancelled or timed out underneath the bridge are
    /// discarded.
    pub fn complete(&self, id: &TaskId, result: Option<String>) -> Result<(), EngineError> {
        let task = self
            .bus
            .get_task_status(id)
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;

        match task.state {
            TaskState::Completed => {
                return if task.result == result {
                    Ok(())
                } else {
                    Err(EngineError::Protocol(format!(
                        "conflicting completion for task {}",
                        id
                    )))
                };
            }
            TaskState::Running => {}
            // cancelled or re-queued underneath the bridge: discard
            _ => return Ok(()),
        }

        let now = self.clock.epoch_ms();
        self.bus.store().update_task(id, |t| t.result = result.clone());
        let task = self.bus.store().transition_task(id, TaskState::Completed, now)?;

        {
            let mut inner = self.inner.lock();
            inner.in_flight.remove(id);
        }

        self.metrics.incr_counter("tasks_completed", &[], 1);
        if let Some(started) = task.started_at_ms {
            self.metrics.observe_histogram(
                "task_duration_seconds",
                &[("agent", task.agent.as_str())],
                now.saturating_sub(started) as f64 / 1000.0,
            );
        }
        self.bus.broadcast_event(Event::TaskCompleted {
            id: id.clone(),
            result: result.clone(),
        });
        self.bus
            .publish_result(TaskResult::completed(id.clone(), result))?;
        tracing::info!(task = %id, "task completed");

        self.resolve_dependents(id)?;
        Ok(())
    }

    /// Report a failed attempt; retries with backoff while budget remains.
    pub fn fail(&self, id: &TaskId, error: &str) -> Result<(), EngineError> {
        self.fail_inner(id, error, false)
    }

    /// Fail non-retriably (sentinel contract violations).
    pub fn fail_protocol(&self, id: &TaskId, error: &str) -> Result<(), EngineError> {
        self.fail_inner(id, error, true)
    }

    fn fail_inner(&self, id: &TaskId, error: &str, non_retriable: bool) -> Result<(), EngineError> {
        let task = self
            .bus
            .get_task_status(id)
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;

        // already settled (cancelled mid-flight, duplicate report): discard
        if task.state != TaskState::Running {
            return Ok(());
        }

        let now = self.clock.epoch_ms();
        self.bus
            .store()
            .update_task(id, |t| t.error = Some(error.to_string()));

        if !non_retriable && task.retry_count < task.max_retries {
            let retry_count = task.retry_count + 1;
            self.bus.store().update_task(id, |t| t.retry_count = retry_count);
            self.bus.store().transition_task(id, TaskState::Retrying, now)?;

            let backoff = retry_backoff(retry_count);
            let visible_at = now + backoff.as_millis() as u64;
            {
                let mut inner = self.inner.lock();
                inner.in_flight.remove(id);
                inner.delayed.insert((visible_at, id.clone()));
            }

            self.metrics.incr_counter("tasks_retried", &[], 1);
            self.bus.broadcast_event(Event::TaskRetrying {
                id: id.clone(),
                retry_count,
                visible_at_ms: visible_at,
            });
            tracing::info!(
                task = %id,
                retry = retry_count,
                max = task.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error,
                "task failed, retrying"
            );
            return Ok(());
        }

        self.bus.store().transition_task(id, TaskState::Failed, now)?;
        {
            let mut inner = self.inner.lock();
            inner.in_flight.remove(id);
        }

        self.metrics.incr_counter("tasks_failed", &[], 1);
        self.bus.broadcast_event(Event::TaskFailed {
            id: id.clone(),
            error: error.to_string(),
            protocol_violation: non_retriable,
        });
        self.bus
            .publish_result(TaskResult::failed(id.clone(), error))?;
        tracing::warn!(task = %id, error, non_retriable, "task failed terminally");

        self.skip_dependents_of(id)?;
        Ok(())
    }

    /// Cancel a task. Terminal tasks are left untouched (no-op).
    pub fn cancel(&self, id: &TaskId) -> Result<(), EngineError> {
        let task = self
            .bus
            .get_task_status(id)
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;

        if task.is_terminal() {
            return Ok(());
        }

        let now = self.clock.epoch_ms();
        self.bus.store().transition_task(id, TaskState::Cancelled, now)?;
        self.detach(id, &task);

        self.metrics.incr_counter("tasks_cancelled", &[], 1);
        self.bus.broadcast_event(Event::TaskCancelled { id: id.clone() });
        self.bus.publish_result(TaskResult::cancelled(id.clone()))?;
        tracing::info!(task = %id, "task cancelled");

        self.skip_dependents_of(id)?;
        Ok(())
    }

    /// Remove a task from every queue structure.
    fn detach(&self, id: &TaskId, task: &Task) {
        let mut inner = self.inner.lock();
        if let Some(set) = inner.ready.get_mut(&task.agent) {
            set.remove(&QueueKey::of(task));
        }
        let delayed: Vec<(u64, TaskId)> = inner
            .delayed
            .iter()
            .filter(|(_, tid)| tid == id)
            .cloned()
            .collect();
        for entry in delayed {
            inner.delayed.remove(&entry);
        }
        for waiters in inner.awaiting.values_mut() {
            waiters.remove(id);
        }
        inner.in_flight.remove(id);
    }

    // --- dependency resolution ---

    /// Schedule delayed tasks whose dependencies are now all satisfied.
    fn resolve_dependents(&self, completed: &TaskId) -> Result<(), EngineError> {
        let dependents: Vec<TaskId> = {
            let mut inner = self.inner.lock();
            inner
                .awaiting
                .remove(completed)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default()
        };

        for dependent in dependents {
            let Some(task) = self.bus.get_task_status(&dependent) else {
                continue;
            };
            if task.state != TaskState::Pending {
                continue;
            }
            let all_done = task.dependencies.iter().all(|dep| {
                self.bus
                    .get_task_status(dep)
                    .is_some_and(|d| d.state == TaskState::Completed)
            });
            if !all_done {
                continue;
            }

            {
                let mut inner = self.inner.lock();
                inner.delayed.remove(&(NEVER_MS, dependent.clone()));
            }
            self.make_visible(&dependent)?;
        }
        Ok(())
    }

    /// Cascade SKIPPED through everything waiting on a failed/cancelled task.
    fn skip_dependents_of(&self, failed: &TaskId) -> Result<(), EngineError> {
        let dependents: Vec<TaskId> = {
            let mut inner = self.inner.lock();
            inner
                .awaiting
                .remove(failed)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default()
        };

        for dependent in dependents {
            self.skip_task(&dependent, failed)?;
        }
        Ok(())
    }

    fn skip_task(&self, id: &TaskId, dependency: &TaskId) -> Result<(), EngineError> {
        let Some(task) = self.bus.get_task_status(id) else {
            return Ok(());
        };
        if task.is_terminal() {
            return Ok(());
        }

        let now = self.clock.epoch_ms();
        self.bus.store().transition_task(id, TaskState::Skipped, now)?;
        self.detach(id, &task);

        self.bus.broadcast_event(Event::TaskSkipped {
            id: id.clone(),
            dependency: dependency.clone(),
        });
        self.bus
            .publish_result(TaskResult::skipped(id.clone(), dependency))?;
        tracing::info!(task = %id, dependency = %dependency, "task skipped");

        // skipping counts as not-completed for anything downstream
        self.skip_dependents_of(id)?;
        Ok(())
    }

    /// Rebuild queue structures from store records after a journal replay.
    ///
    /// Scheduled tasks re-enter their ready sets; Retrying tasks become due
    /// immediately; dependency-gated Pending tasks re-register their gates;
    /// tasks that were Running when the orchestrator died re-enter through
    /// the failure path, so the retry budget decides their fate.
    pub fn recover(&self) -> Result<usize, EngineError> {
        let tasks = self.bus.store().tasks();
        let now = self.clock.epoch_ms();
        let mut restored = 0;

        for task in tasks {
            match task.state {
                TaskState::Scheduled => {
                    let mut inner = self.inner.lock();
                    inner
                        .ready
                        .entry(task.agent.clone())
                        .or_default()
                        .insert(QueueKey::of(&task));
                    restored += 1;
                }
                TaskState::Retrying => {
                    let mut inner = self.inner.lock();
                    inner.delayed.insert((now, task.id.clone()));
                    restored += 1;
                }
                TaskState::Pending => {
                    let mut inner = self.inner.lock();
                    inner.delayed.insert((NEVER_MS, task.id.clone()));
                    for dep in &task.dependencies {
                        inner
                            .awaiting
                            .entry(dep.clone())
                            .or_default()
                            .insert(task.id.clone());
                    }
                    restored += 1;
                }
                TaskState::Running => {
                    self.fail(&task.id, "orchestrator restarted")?;
                    restored += 1;
                }
                _ => {}
            }
        }

        // dependency-gated tasks whose gates resolved before the crash
        let completed: Vec<TaskId> = self
            .bus
            .store()
            .tasks()
            .into_iter()
            .filter(|t| t.state == TaskState::Completed)
            .map(|t| t.id)
            .collect();
        for id in completed {
            self.resolve_dependents(&id)?;
        }

        if restored > 0 {
            tracing::info!(restored, "queue state recovered");
        }
        Ok(restored)
    }

    // --- background tick bodies (driven by crate::loops) ---

    /// Promote delayed tasks whose visibility time has arrived.
    ///
    /// The scan is bounded; dependency-gated entries (visible at NEVER_MS)
    /// are promoted by `resolve_dependents` instead.
    pub fn promote_due(&self) -> Result<usize, EngineError> {
        let now = self.clock.epoch_ms();
        let due: Vec<(u64, TaskId)> = {
            let inner = self.inner.lock();
            inner
                .delayed
                .iter()
                .take_while(|(visible_at, _)| *visible_at <= now)
                .take(PROMOTE_SCAN_LIMIT)
                .cloned()
                .collect()
        };

        let mut promoted = 0;
        for entry in due {
            {
                let mut inner = self.inner.lock();
                inner.delayed.remove(&entry);
            }
            let (_, id) = entry;
            let Some(task) = self.bus.get_task_status(&id) else {
                continue;
            };
            match task.state {
                // backoff expired: re-enter the queue
                TaskState::Retrying => {
                    self.bus.store().transition_task(&id, TaskState::Pending, now)?;
                    self.make_visible(&id)?;
                    promoted += 1;
                }
                TaskState::Pending => {
                    self.make_visible(&id)?;
                    promoted += 1;
                }
                _ => {}
            }
        }
        Ok(promoted)
    }

    /// Fail in-flight tasks that exceeded their timeout budget.
    pub fn check_timeouts(&self) -> Vec<TaskId> {
        let now = self.clock.epoch_ms();
        let expired: Vec<(TaskId, AgentId, u64)> = {
            let inner = self.inner.lock();
            inner
                .in_flight
                .iter()
                .filter(|(_, f)| now.saturating_sub(f.started_at_ms) > f.timeout_ms)
                .map(|(id, f)| (id.clone(), f.agent.clone(), f.timeout_ms / 1000))
                .collect()
        };

        let mut timed_out = Vec::new();
        for (id, agent, seconds) in expired {
            let error = EngineError::TaskTimeout {
                id: id.clone(),
                seconds,
            };
            tracing::warn!(task = %id, agent = %agent, %error, "task timed out");
            if self.fail(&id, &error.to_string()).is_ok() {
                timed_out.push(id);
            }
        }
        timed_out
    }

    /// Mark agents with stale heartbeats OFFLINE.
    pub fn sweep_offline_agents(&self) -> Vec<AgentId> {
        let now = self.clock.epoch_ms();
        let offline = self
            .bus
            .sweep_offline(now, self.config.offline_timeout.as_millis() as u64);
        if !offline.is_empty() {
            self.metrics
                .incr_counter("heartbeat_misses", &[], offline.len() as u64);
        }
        offline
    }

    /// Evict expired terminal records and their result slots.
    pub fn clean_expired(&self) -> usize {
        let now = self.clock.epoch_ms();
        let evicted = self.bus.store().purge_expired(now);
        for id in &evicted {
            self.bus.forget_result(id);
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted expired task records");
        }
        evicted.len()
    }

    /// Refresh queue depth and agent gauges.
    pub fn update_gauges(&self) {
        let depths: Vec<(AgentId, Priority, usize)> = {
            let inner = self.inner.lock();
            inner
                .ready
                .iter()
                .flat_map(|(agent, set)| {
                    Priority::ALL.into_iter().map(move |p| {
                        let n = set.iter().filter(|k| k.priority == p).count();
                        (agent.clone(), p, n)
                    })
                })
                .collect()
        };
        for (agent, priority, depth) in depths {
            self.metrics.set_gauge(
                "queue_depth",
                &[("agent", agent.as_str()), ("priority", priority.as_str())],
                depth as f64,
            );
        }

        let active = self
            .bus
            .store()
            .agents()
            .iter()
            .filter(|a| a.status != AgentStatus::Offline)
            .count();
        self.metrics.set_gauge("agents_active", &[], active as f64);
    }

    // --- status surface ---

    /// Ready-set depth per agent.
    pub fn depths(&self) -> Vec<(AgentId, usize)> {
        let inner = self.inner.lock();
        let mut depths: Vec<(AgentId, usize)> = inner
            .ready
            .iter()
            .map(|(agent, set)| (agent.clone(), set.len()))
            .collect();
        depths.sort_by(|a, b| a.0.cmp(&b.0));
        depths
    }

    pub fn processing_count(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn delayed_count(&self) -> usize {
        self.inner.lock().delayed.len()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
