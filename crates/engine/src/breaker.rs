// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker and bulkhead isolation.
//!
//! One breaker guards one named call scope (`agent:<id>`, an outbound
//! dependency). Time is passed in as epoch milliseconds so the state machine
//! stays deterministic under test.

use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Breaker state machine.
///
/// ```text
/// Closed ── threshold consecutive failures ──▶ Open
///   ▲                                           │ open_timeout elapsed
///   │                                           ▼
///   └── success_threshold successes ──── HalfOpen ── any failure ──▶ Open
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it
    pub success_threshold: u32,
    /// How long the breaker stays open before probing
    pub open_timeout: Duration,
    /// Sliding window length for the error-rate stat
    pub window: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            window: 10,
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Last `window` outcomes, true = success
    outcomes: VecDeque<bool>,
    opened_at_ms: u64,
}

/// Circuit breaker for one named scope. Clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                outcomes: VecDeque::new(),
                opened_at_ms: 0,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether a call may proceed now.
    ///
    /// An Open breaker whose timeout has elapsed transitions to HalfOpen and
    /// admits the probe call.
    pub fn allow_call(&self, now_ms: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = now_ms.saturating_sub(inner.opened_at_ms);
                if elapsed >= self.config.open_timeout.as_millis() as u64 {
                    inner.state = BreakerState::HalfOpen;
                    inner.consecutive_successes = 0;
                    tracing::info!(scope = %self.name, "breaker half-open, probing");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Returns the new state if it changed.
    pub fn record_success(&self, _now_ms: u64) -> Option<BreakerState> {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        Self::push_outcome(&mut inner.outcomes, self.config.window, true);

        match inner.state {
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_successes = 0;
                    tracing::info!(scope = %self.name, "breaker closed");
                    return Some(BreakerState::Closed);
                }
                None
            }
            _ => None,
        }
    }

    /// Record a failed call. Returns the new state if it changed.
    pub fn record_failure(&self, now_ms: u64) -> Option<BreakerState> {
        let mut inner = self.inner.lock();
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;
        Self::push_outcome(&mut inner.outcomes, self.config.window, false);

        let should_open = match inner.state {
            // any half-open failure re-opens
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            BreakerState::Open => false,
        };

        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at_ms = now_ms;
            inner.consecutive_failures = 0;
            tracing::warn!(scope = %self.name, "breaker opened");
            return Some(BreakerState::Open);
        }
        None
    }

    /// Share of failures in the sliding window.
    pub fn error_rate(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.outcomes.is_empty() {
            return 0.0;
        }
        let failures = inner.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / inner.outcomes.len() as f64
    }

    fn push_outcome(outcomes: &mut VecDeque<bool>, window: usize, ok: bool) {
        outcomes.push_back(ok);
        while outcomes.len() > window {
            outcomes.pop_front();
        }
    }
}

/// Shared registry of breakers keyed by scope name.
#[derive(Clone, Default)]
pub struct BreakerRegistry {
    inner: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str, config: BreakerConfig) -> CircuitBreaker {
        let mut inner = self.inner.lock();
        inner
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(name, config))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.inner.lock().get(name).cloned()
    }

    /// Snapshot of (scope, state) pairs for the status surface.
    pub fn states(&self) -> Vec<(String, BreakerState)> {
        let mut states: Vec<(String, BreakerState)> = self
            .inner
            .lock()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

/// Per-scope concurrency limiter with a bounded wait queue.
///
/// Up to `max_concurrent` calls run at once; up to `max_queued` more wait.
/// Anything past both is rejected immediately.
#[derive(Clone)]
pub struct Bulkhead {
    name: String,
    semaphore: Arc<Semaphore>,
    queued: Arc<Mutex<usize>>,
    max_queued: usize,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, max_concurrent: usize, max_queued: usize) -> Self {
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            queued: Arc::new(Mutex::new(0)),
            max_queued,
        }
    }

    /// Run `fut` inside the bulkhead.
    pub async fn execute<T, F>(&self, fut: F) -> Result<T, EngineError>
    where
        F: std::future::Future<Output = T>,
    {
        // fast path: a permit is free
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                {
                    let mut queued = self.queued.lock();
                    if *queued >= self.max_queued {
                        return Err(EngineError::Transient(format!(
                            "bulkhead {} rejected: queue full",
                            self.name
                        )));
                    }
                    *queued += 1;
                }
                let acquired = self.semaphore.clone().acquire_owned().await;
                *self.queued.lock() -= 1;
                acquired.map_err(|_| EngineError::Internal("bulkhead semaphore closed".into()))?
            }
        };

        let out = fut.await;
        drop(permit);
        Ok(out)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
