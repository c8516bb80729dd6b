// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow definitions (immutable templates) and per-run execution state.

use crate::agent::{AgentId, Roster};
use crate::task::TaskId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;

crate::define_id! {
    /// Identifier of a workflow definition.
    pub struct WorkflowId;
}

crate::define_id! {
    /// Identifier of one run of a workflow.
    pub struct ExecutionId;
}

/// Step actions the engine knows how to turn into task commands.
///
/// The set is closed; unknown actions are rejected when the workflow is
/// defined.
pub const KNOWN_ACTIONS: [&str; 2] = ["shell", "prompt"];

/// One step template inside a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Unique within the workflow
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub agent: AgentId,
    /// Command kind, one of [`KNOWN_ACTIONS`]
    pub action: String,
    /// Parameters; values may contain `${key}` placeholders resolved against
    /// the execution context at submit time
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_step_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retry_on_failure: bool,
    #[serde(default = "default_step_retries")]
    pub max_retries: u32,
}

fn default_step_timeout() -> u64 {
    300
}

fn default_step_retries() -> u32 {
    2
}

impl StepTemplate {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Retry budget as submitted to the queue.
    pub fn retry_budget(&self) -> u32 {
        if self.retry_on_failure {
            self.max_retries
        } else {
            0
        }
    }
}

/// An immutable workflow template: a named DAG of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    pub steps: Vec<StepTemplate>,
}

/// Rejected workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowValidationError {
    #[error("workflow has no steps")]
    NoSteps,
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },
    #[error("step {0} depends on itself")]
    SelfDependency(String),
    #[error("dependency cycle involving steps: {0}")]
    Cycle(String),
    #[error("step {step} targets unknown agent {agent}")]
    UnknownAgent { step: String, agent: AgentId },
    #[error("step {step} has unknown action {action}")]
    UnknownAction { step: String, action: String },
}

impl WorkflowSpec {
    /// Validate ids, dependencies, actions, acyclicity, and (when a roster is
    /// given) agent references.
    pub fn validate(&self, roster: Option<&Roster>) -> Result<(), WorkflowValidationError> {
        if self.steps.is_empty() {
            return Err(WorkflowValidationError::NoSteps);
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(WorkflowValidationError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &self.steps {
            if !KNOWN_ACTIONS.contains(&step.action.as_str()) {
                return Err(WorkflowValidationError::UnknownAction {
                    step: step.id.clone(),
                    action: step.action.clone(),
                });
            }
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(WorkflowValidationError::SelfDependency(step.id.clone()));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(WorkflowValidationError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if let Some(roster) = roster {
                if !roster.contains(&step.agent) {
                    return Err(WorkflowValidationError::UnknownAgent {
                        step: step.id.clone(),
                        agent: step.agent.clone(),
                    });
                }
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm; leftover nodes are on a cycle.
    fn check_acyclic(&self) -> Result<(), WorkflowValidationError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for step in &self.steps {
            in_degree.entry(step.id.as_str()).or_insert(0);
            for dep in &step.depends_on {
                *in_degree.entry(step.id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(&step.id);
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if visited == self.steps.len() {
            Ok(())
        } else {
            let mut cyclic: Vec<&str> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(id, _)| *id)
                .collect();
            cyclic.sort_unstable();
            Err(WorkflowValidationError::Cycle(cyclic.join(", ")))
        }
    }

    pub fn get_step(&self, id: &str) -> Option<&StepTemplate> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// State of one step instance inside an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    /// A dependency failed, was skipped, or the execution was cancelled
    Skipped,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Failed | StepState::Skipped
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Completed => "completed",
            StepState::Failed => "failed",
            StepState::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// One step of one execution: the template plus run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInstance {
    pub template: StepTemplate,
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl StepInstance {
    fn new(template: StepTemplate) -> Self {
        Self {
            template,
            state: StepState::Pending,
            task_id: None,
            result: None,
            error: None,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }
}

/// Overall status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Ready => "ready",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Per-run state of a workflow: step instances plus the shared context map.
///
/// Steps keep definition order (insertion order of the map). The DAG logic
/// here is pure; the engine drives it and owns all I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub steps: IndexMap<String, StepInstance>,
    /// Caller params, augmented with `step_<id>_result` after each step
    pub context: HashMap<String, String>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl WorkflowExecution {
    pub fn new(
        id: ExecutionId,
        workflow_id: WorkflowId,
        spec: &WorkflowSpec,
        params: HashMap<String, String>,
        epoch_ms: u64,
    ) -> Self {
        let steps = spec
            .steps
            .iter()
            .map(|t| (t.id.clone(), StepInstance::new(t.clone())))
            .collect();
        Self {
            id,
            workflow_id,
            status: ExecutionStatus::Ready,
            steps,
            context: params,
            started_at_ms: epoch_ms,
            finished_at_ms: None,
        }
    }

    /// Steps that can run now: Pending with every dependency Completed.
    pub fn ready_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|(_, inst)| inst.state == StepState::Pending)
            .filter(|(_, inst)| {
                inst.template.depends_on.iter().all(|dep| {
                    self.steps
                        .get(dep)
                        .is_some_and(|d| d.state == StepState::Completed)
                })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether every step has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.steps.values().all(|s| s.state.is_terminal())
    }

    /// Whether any step failed.
    pub fn any_failed(&self) -> bool {
        self.steps.values().any(|s| s.state == StepState::Failed)
    }

    pub fn mark_step_running(&mut self, step_id: &str, task_id: TaskId, epoch_ms: u64) {
        if let Some(inst) = self.steps.get_mut(step_id) {
            inst.state = StepState::Running;
            inst.task_id = Some(task_id);
            inst.started_at_ms = Some(epoch_ms);
        }
    }

    /// Record a completed step and publish its result into the context as
    /// `step_<id>_result`.
    pub fn mark_step_completed(&mut self, step_id: &str, result: Option<String>, epoch_ms: u64) {
        if let Some(inst) = self.steps.get_mut(step_id) {
            inst.state = StepState::Completed;
            inst.result = result.clone();
            inst.finished_at_ms = Some(epoch_ms);
        }
        self.context.insert(
            format!("step_{}_result", step_id),
            result.unwrap_or_default(),
        );
    }

    pub fn mark_step_failed(&mut self, step_id: &str, error: impl Into<String>, epoch_ms: u64) {
        if let Some(inst) = self.steps.get_mut(step_id) {
            inst.state = StepState::Failed;
            inst.error = Some(error.into());
            inst.finished_at_ms = Some(epoch_ms);
        }
    }

    /// Skip every non-terminal transitive dependent of `step_id`.
    ///
    /// Returns the skipped step ids in definition order.
    pub fn skip_dependents(&mut self, step_id: &str, epoch_ms: u64) -> Vec<String> {
        let mut frontier: VecDeque<String> = VecDeque::new();
        frontier.push_back(step_id.to_string());
        let mut to_skip: HashSet<String> = HashSet::new();

        while let Some(current) = frontier.pop_front() {
            for (id, inst) in &self.steps {
                if to_skip.contains(id) || inst.state.is_terminal() {
                    continue;
                }
                if inst.template.depends_on.iter().any(|d| *d == current) {
                    to_skip.insert(id.clone());
                    frontier.push_back(id.clone());
                }
            }
        }

        let mut skipped = Vec::new();
        for (id, inst) in self.steps.iter_mut() {
            if to_skip.contains(id) {
                inst.state = StepState::Skipped;
                inst.finished_at_ms = Some(epoch_ms);
                skipped.push(id.clone());
            }
        }
        skipped
    }

    /// Skip every remaining non-terminal step (cancellation path).
    pub fn skip_remaining(&mut self, epoch_ms: u64) -> Vec<String> {
        let mut skipped = Vec::new();
        for (id, inst) in self.steps.iter_mut() {
            if !inst.state.is_terminal() {
                inst.state = StepState::Skipped;
                inst.finished_at_ms = Some(epoch_ms);
                skipped.push(id.clone());
            }
        }
        skipped
    }

    /// Task ids of steps currently running.
    pub fn running_task_ids(&self) -> Vec<TaskId> {
        self.steps
            .values()
            .filter(|s| s.state == StepState::Running)
            .filter_map(|s| s.task_id.clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
