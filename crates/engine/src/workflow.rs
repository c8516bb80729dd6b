// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow engine: DAGs of steps executed as queue tasks.
//!
//! Definitions are validated once (`define`) and immutable; each `execute`
//! builds an independent execution whose ready steps are submitted at HIGH
//! priority and awaited in parallel under a bounded pool. Step results land
//! in the execution context as `step_<id>_result` and feed `${key}`
//! substitution of later steps' params.

use crate::error::EngineError;
use crate::queue::TaskQueue;
use fleet_bus::TaskResult;
use fleet_core::workflow::{StepTemplate, WorkflowSpec};
use fleet_core::{
    Clock, Event, ExecutionId, ExecutionStatus, IdGen, Priority, TaskCommand, TaskConfig, TaskId,
    TaskState, WorkflowExecution, WorkflowId,
};
use fleet_core::Roster;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};

/// Fixed pool size for parallel step execution.
const STEP_POOL_SIZE: usize = 10;

/// Substitute `${key}` placeholders from the context.
///
/// Unknown placeholders stay literal and are reported back for a warning
/// event.
pub fn substitute(template: &str, context: &HashMap<String, String>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut unknown = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match context.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        unknown.push(key.to_string());
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // unterminated placeholder: keep the tail literally
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    (out, unknown)
}

/// Build the task command for a step from its (substituted) params.
fn step_command(step: &StepTemplate, params: &HashMap<String, String>) -> Result<TaskCommand, EngineError> {
    match step.action.as_str() {
        "shell" => params
            .get("line")
            .map(|line| TaskCommand::Shell { line: line.clone() })
            .ok_or_else(|| {
                EngineError::Validation(format!("step {} missing param \"line\"", step.id))
            }),
        "prompt" => params
            .get("text")
            .map(|text| TaskCommand::Prompt { text: text.clone() })
            .ok_or_else(|| {
                EngineError::Validation(format!("step {} missing param \"text\"", step.id))
            }),
        other => Err(EngineError::Validation(format!(
            "step {} has unknown action {}",
            step.id, other
        ))),
    }
}

enum Turn {
    Finish(ExecutionStatus),
    Launch(Vec<String>),
    Wait,
}

/// Executes workflow DAGs against the queue.
pub struct WorkflowEngine<C: Clock, G: IdGen> {
    queue: Arc<TaskQueue<C, G>>,
    clock: C,
    ids: G,
    roster: Roster,
    workflows: Mutex<HashMap<WorkflowId, WorkflowSpec>>,
    executions: Arc<Mutex<HashMap<ExecutionId, WorkflowExecution>>>,
    /// Wakes an execution's run loop on cancel
    controls: Mutex<HashMap<ExecutionId, watch::Sender<bool>>>,
    pool: Arc<Semaphore>,
}

impl<C: Clock, G: IdGen> WorkflowEngine<C, G> {
    pub fn new(queue: Arc<TaskQueue<C, G>>, clock: C, ids: G, roster: Roster) -> Self {
        Self {
            queue,
            clock,
            ids,
            roster,
            workflows: Mutex::new(HashMap::new()),
            executions: Arc::new(Mutex::new(HashMap::new())),
            controls: Mutex::new(HashMap::new()),
            pool: Arc::new(Semaphore::new(STEP_POOL_SIZE)),
        }
    }

    /// Validate and register a workflow definition.
    pub fn define(&self, spec: WorkflowSpec) -> Result<WorkflowId, EngineError> {
        spec.validate(Some(&self.roster))?;
        // the payload param is required up front, not at first execution
        for step in &spec.steps {
            step_command(step, &step.params)?;
        }

        let id = WorkflowId::new(self.ids.next());
        self.queue.bus().broadcast_event(Event::WorkflowDefined {
            id: id.clone(),
            name: spec.name.clone(),
            steps: spec.steps.len(),
        });
        tracing::info!(workflow = %id, name = %spec.name, steps = spec.steps.len(), "workflow defined");
        self.workflows.lock().insert(id.clone(), spec);
        Ok(id)
    }

    pub fn workflow(&self, id: &WorkflowId) -> Option<WorkflowSpec> {
        self.workflows.lock().get(id).cloned()
    }

    /// Snapshot of one execution.
    pub fn status(&self, id: &ExecutionId) -> Option<WorkflowExecution> {
        self.executions.lock().get(id).cloned()
    }

    /// Executions in submission order is not tracked; callers sort by id.
    pub fn executions(&self) -> Vec<WorkflowExecution> {
        let mut all: Vec<WorkflowExecution> =
            self.executions.lock().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Start a new run of a defined workflow.
    ///
    /// Returns immediately with the execution id; the run loop is a spawned
    /// task. Re-running the same workflow yields an independent execution.
    pub fn execute(
        self: &Arc<Self>,
        workflow_id: &WorkflowId,
        params: HashMap<String, String>,
    ) -> Result<ExecutionId, EngineError> {
        let spec = self
            .workflow(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let exec_id = ExecutionId::new(self.ids.next());
        let execution = WorkflowExecution::new(
            exec_id.clone(),
            workflow_id.clone(),
            &spec,
            params,
            self.clock.epoch_ms(),
        );
        self.executions.lock().insert(exec_id.clone(), execution);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.controls.lock().insert(exec_id.clone(), cancel_tx);

        self.queue.bus().broadcast_event(Event::WorkflowStarted {
            execution_id: exec_id.clone(),
            workflow_id: workflow_id.clone(),
        });
        tracing::info!(execution = %exec_id, workflow = %workflow_id, "execution started");

        let engine = Arc::clone(self);
        let run_id = exec_id.clone();
        tokio::spawn(async move {
            engine.run_execution(run_id, spec, cancel_rx).await;
        });

        Ok(exec_id)
    }

    /// Cancel an execution: cancel its live tasks, skip the rest.
    pub fn cancel(&self, id: &ExecutionId) -> Result<(), EngineError> {
        let running: Vec<TaskId> = {
            let mut executions = self.executions.lock();
            let execution = executions
                .get_mut(id)
                .ok_or_else(|| EngineError::ExecutionNotFound(id.to_string()))?;
            if execution.status.is_terminal() {
                return Ok(());
            }
            execution.status = ExecutionStatus::Cancelled;
            let running = execution.running_task_ids();
            execution.skip_remaining(self.clock.epoch_ms());
            running
        };

        for task_id in running {
            if let Err(e) = self.queue.cancel(&task_id) {
                tracing::warn!(task = %task_id, error = %e, "step task cancel failed");
            }
        }

        // wake the run loop so it finalizes promptly
        if let Some(cancel_tx) = self.controls.lock().get(id) {
            let _ = cancel_tx.send(true);
        }
        Ok(())
    }

    async fn run_execution(
        self: Arc<Self>,
        exec_id: ExecutionId,
        spec: WorkflowSpec,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(String, TaskResult)>();

        loop {
            let turn = self.plan_turn(&exec_id);
            match turn {
                Turn::Finish(status) => {
                    self.finalize(&exec_id, status);
                    return;
                }
                Turn::Launch(step_ids) => {
                    for step_id in step_ids {
                        self.launch_step(&exec_id, &spec, &step_id, result_tx.clone());
                    }
                }
                Turn::Wait => {
                    tokio::select! {
                        received = result_rx.recv() => {
                            let Some((step_id, outcome)) = received else { return };
                            self.apply_outcome(&exec_id, &step_id, outcome);
                        }
                        _ = cancel_rx.changed() => {}
                    }
                }
            }
        }
    }

    /// Decide what the run loop does next, under the executions lock.
    fn plan_turn(&self, exec_id: &ExecutionId) -> Turn {
        let mut executions = self.executions.lock();
        let Some(execution) = executions.get_mut(exec_id) else {
            return Turn::Finish(ExecutionStatus::Failed);
        };

        if execution.status == ExecutionStatus::Cancelled {
            return Turn::Finish(ExecutionStatus::Cancelled);
        }

        let ready = execution.ready_steps();
        if !ready.is_empty() {
            if execution.status == ExecutionStatus::Ready {
                execution.status = ExecutionStatus::Running;
            }
            return Turn::Launch(ready);
        }

        if execution.is_settled() {
            return Turn::Finish(if execution.any_failed() {
                ExecutionStatus::Failed
            } else {
                ExecutionStatus::Completed
            });
        }

        let any_running = execution
            .steps
            .values()
            .any(|s| s.state == fleet_core::workflow::StepState::Running);
        if any_running {
            return Turn::Wait;
        }

        // no ready steps, nothing running, not settled: no progress possible
        execution.skip_remaining(self.clock.epoch_ms());
        Turn::Finish(ExecutionStatus::Failed)
    }

    /// Submit one step's task and spawn its result waiter in the pool.
    fn launch_step(
        self: &Arc<Self>,
        exec_id: &ExecutionId,
        spec: &WorkflowSpec,
        step_id: &str,
        result_tx: mpsc::UnboundedSender<(String, TaskResult)>,
    ) {
        let bus = self.queue.bus();
        let Some(step) = spec.get_step(step_id) else {
            return;
        };

        // resolve placeholders against the current context
        let context = {
            let executions = self.executions.lock();
            executions
                .get(exec_id)
                .map(|e| e.context.clone())
                .unwrap_or_default()
        };
        let mut params: HashMap<String, String> = HashMap::new();
        for (key, raw) in &step.params {
            let (value, unknown) = substitute(raw, &context);
            for key in unknown {
                bus.broadcast_event(Event::WorkflowStepWarning {
                    execution_id: exec_id.clone(),
                    step: step_id.to_string(),
                    message: format!("unresolved placeholder ${{{}}}", key),
                });
            }
            params.insert(key.clone(), value);
        }

        let command = match step_command(step, &params) {
            Ok(command) => command,
            Err(e) => {
                self.fail_step(exec_id, step_id, &e.to_string());
                return;
            }
        };

        let mut config = TaskConfig::new(step.display_name(), step.agent.clone(), command);
        config.priority = Priority::High;
        config.timeout_seconds = step.timeout_seconds;
        config.max_retries = step.retry_budget();
        config.params = params;
        config
            .metadata
            .insert("execution_id".to_string(), exec_id.to_string());
        config
            .metadata
            .insert("step_id".to_string(), step_id.to_string());

        let task_id = match self.queue.submit(config) {
            Ok(task_id) => task_id,
            Err(e) => {
                self.fail_step(exec_id, step_id, &e.to_string());
                return;
            }
        };

        {
            let mut executions = self.executions.lock();
            if let Some(execution) = executions.get_mut(exec_id) {
                execution.mark_step_running(step_id, task_id.clone(), self.clock.epoch_ms());
            }
        }
        bus.broadcast_event(Event::WorkflowStepStarted {
            execution_id: exec_id.clone(),
            step: step_id.to_string(),
            task_id: task_id.clone(),
        });

        let waiter = bus.subscribe_result(&task_id);
        let pool = Arc::clone(&self.pool);
        let step_name = step_id.to_string();
        tokio::spawn(async move {
            // pool bounds how many step waiters run concurrently
            let _permit = pool.acquire_owned().await;
            let outcome = match waiter.wait().await {
                Ok(outcome) => outcome,
                Err(e) => TaskResult::failed(task_id, e.to_string()),
            };
            let _ = result_tx.send((step_name, outcome));
        });
    }

    /// Record a step result and cascade skips on failure.
    fn apply_outcome(&self, exec_id: &ExecutionId, step_id: &str, outcome: TaskResult) {
        let bus = self.queue.bus().clone();
        let now = self.clock.epoch_ms();
        let mut executions = self.executions.lock();
        let Some(execution) = executions.get_mut(exec_id) else {
            return;
        };

        if outcome.state == TaskState::Completed {
            execution.mark_step_completed(step_id, outcome.result, now);
            bus.broadcast_event(Event::WorkflowStepCompleted {
                execution_id: exec_id.clone(),
                step: step_id.to_string(),
            });
            return;
        }

        // cancelled steps on a cancelled execution were already skipped
        if execution.status == ExecutionStatus::Cancelled {
            return;
        }

        let error = outcome
            .error
            .unwrap_or_else(|| format!("task ended {}", outcome.state));
        execution.mark_step_failed(step_id, error.clone(), now);
        bus.broadcast_event(Event::WorkflowStepFailed {
            execution_id: exec_id.clone(),
            step: step_id.to_string(),
            error,
        });
        for skipped in execution.skip_dependents(step_id, now) {
            bus.broadcast_event(Event::WorkflowStepSkipped {
                execution_id: exec_id.clone(),
                step: skipped,
            });
        }
    }

    fn fail_step(&self, exec_id: &ExecutionId, step_id: &str, error: &str) {
        let bus = self.queue.bus().clone();
        let now = self.clock.epoch_ms();
        let mut executions = self.executions.lock();
        let Some(execution) = executions.get_mut(exec_id) else {
            return;
        };
        execution.mark_step_failed(step_id, error, now);
        bus.broadcast_event(Event::WorkflowStepFailed {
            execution_id: exec_id.clone(),
            step: step_id.to_string(),
            error: error.to_string(),
        });
        for skipped in execution.skip_dependents(step_id, now) {
            bus.broadcast_event(Event::WorkflowStepSkipped {
                execution_id: exec_id.clone(),
                step: skipped,
            });
        }
    }

    fn finalize(&self, exec_id: &ExecutionId, status: ExecutionStatus) {
        {
            let mut executions = self.executions.lock();
            if let Some(execution) = executions.get_mut(exec_id) {
                execution.status = status;
                execution.finished_at_ms = Some(self.clock.epoch_ms());
            }
        }
        self.controls.lock().remove(exec_id);

        let event = match status {
            ExecutionStatus::Completed => Event::WorkflowCompleted {
                execution_id: exec_id.clone(),
            },
            ExecutionStatus::Cancelled => Event::WorkflowCancelled {
                execution_id: exec_id.clone(),
            },
            _ => Event::WorkflowFailed {
                execution_id: exec_id.clone(),
            },
        };
        tracing::info!(execution = %exec_id, %status, "execution finished");
        self.queue.bus().broadcast_event(event);
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
