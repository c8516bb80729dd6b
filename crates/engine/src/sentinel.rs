// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pane wire protocol: sentinel framing and output parsing.
//!
//! The orchestrator writes lines; the agent writes lines. Sentinels are the
//! only synchronization primitive:
//!
//! ```text
//! ### TASK_START:<id>        orchestrator -> agent, precedes payload
//! <payload lines>
//! ### TASK_END:<id>          orchestrator -> agent, terminates payload
//! COMPLETED:<id> <result>    agent -> orchestrator
//! FAILED:<id> <error>        agent -> orchestrator
//! ```
//!
//! Matching is literal substring by task id; sentinels must sit on their own
//! line. Output that interleaves two task ids inside one task's window
//! violates the contract and fails the task non-retriably.

pub const TASK_START_PREFIX: &str = "### TASK_START:";
pub const TASK_END_PREFIX: &str = "### TASK_END:";
pub const COMPLETED_PREFIX: &str = "COMPLETED:";
pub const FAILED_PREFIX: &str = "FAILED:";
pub const ERROR_PREFIX: &str = "ERROR:";

/// The start sentinel line for a task.
pub fn start_sentinel(task_id: &str) -> String {
    format!("{}{}", TASK_START_PREFIX, task_id)
}

/// The end sentinel line for a task.
pub fn end_sentinel(task_id: &str) -> String {
    format!("{}{}", TASK_END_PREFIX, task_id)
}

/// What a pane capture says about a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneOutcome {
    /// No verdict yet; keep polling
    Pending,
    Completed {
        result: Option<String>,
    },
    Failed {
        error: String,
    },
    /// Output inside our window carried a different task id
    Interleaved {
        other_id: String,
    },
}

/// Extract the marker payload from a line, if the line carries `prefix`.
///
/// Returns `(id, trailing_text)`. The marker may be prefixed by prompt noise
/// (or an echoed `echo '...'` command), but the id must follow the marker
/// directly; ids are `[A-Za-z0-9_-]+`, so shell quoting never bleeds in.
fn match_marker<'a>(line: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let at = line.find(prefix)?;
    let rest = &line[at + prefix.len()..];
    let id_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    let (id, trailing) = rest.split_at(id_end);
    if id.is_empty() {
        return None;
    }
    let trailing = trailing.trim_matches(|c: char| c.is_whitespace() || c == '\'' || c == '"');
    Some((id, trailing))
}

/// Heuristic shell prompt detector for the END-sentinel success path.
fn is_prompt_line(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.ends_with('$') || trimmed.ends_with('#') || trimmed.ends_with('%')
}

/// Parse a pane capture for the verdict on `task_id`.
///
/// Only the window after the last echo of our own start sentinel is
/// considered; older scrollback legitimately contains other tasks.
pub fn parse_pane(pane: &str, task_id: &str) -> PaneOutcome {
    let lines: Vec<&str> = pane.lines().collect();

    // locate our window
    let window_start = lines
        .iter()
        .rposition(|l| match_marker(l, TASK_START_PREFIX).is_some_and(|(id, _)| id == task_id))
        .map(|i| i + 1)
        .unwrap_or(0);
    let window = &lines[window_start..];

    // explicit agent verdicts win, and foreign ids inside our window are a
    // contract violation
    for line in window {
        if let Some((id, trailing)) = match_marker(line, COMPLETED_PREFIX) {
            if id == task_id {
                let result = (!trailing.is_empty()).then(|| trailing.to_string());
                return PaneOutcome::Completed { result };
            }
            return PaneOutcome::Interleaved {
                other_id: id.to_string(),
            };
        }
        for prefix in [FAILED_PREFIX, ERROR_PREFIX] {
            if let Some((id, trailing)) = match_marker(line, prefix) {
                if id == task_id {
                    return PaneOutcome::Failed {
                        error: if trailing.is_empty() {
                            "agent reported failure".to_string()
                        } else {
                            trailing.to_string()
                        },
                    };
                }
                return PaneOutcome::Interleaved {
                    other_id: id.to_string(),
                };
            }
        }
        if let Some((id, _)) = match_marker(line, TASK_START_PREFIX) {
            if id != task_id {
                return PaneOutcome::Interleaved {
                    other_id: id.to_string(),
                };
            }
        }
    }

    // fallback: END sentinel echoed, then output, then a shell prompt
    let end_at = window.iter().rposition(|l| {
        match_marker(l, TASK_END_PREFIX).is_some_and(|(id, _)| id == task_id)
    });
    if let Some(end_at) = end_at {
        let mut collected: Vec<&str> = Vec::new();
        for line in &window[end_at + 1..] {
            if is_prompt_line(line) {
                let text = collected.join("\n");
                let result = (!text.trim().is_empty()).then(|| text.trim().to_string());
                return PaneOutcome::Completed { result };
            }
            if !line.trim().is_empty() {
                collected.push(line.trim_end());
            }
        }
    }

    PaneOutcome::Pending
}

#[cfg(test)]
#[path = "sentinel_tests.rs"]
mod tests;
