// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component health probes and the aggregating collector.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Component health, worst-first ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    #[default]
    Unknown,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unknown => "unknown",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One probe's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl ComponentHealth {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// A named health probe.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> ComponentHealth;
}

/// Probe built from a closure, for components that don't want a dedicated
/// type.
pub struct FnHealthCheck<F> {
    name: String,
    f: F,
}

impl<F> FnHealthCheck<F>
where
    F: Fn() -> ComponentHealth + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> HealthCheck for FnHealthCheck<F>
where
    F: Fn() -> ComponentHealth + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ComponentHealth {
        (self.f)()
    }
}

/// Runs every registered probe on a cadence and aggregates worst-of.
#[derive(Clone, Default)]
pub struct HealthCollector {
    probes: Arc<Mutex<Vec<Arc<dyn HealthCheck>>>>,
    latest: Arc<Mutex<HashMap<String, ComponentHealth>>>,
}

impl HealthCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, probe: Arc<dyn HealthCheck>) {
        self.probes.lock().push(probe);
    }

    /// Run every probe once and store the reports.
    pub async fn run_once(&self) {
        let probes: Vec<Arc<dyn HealthCheck>> = self.probes.lock().clone();
        for probe in probes {
            let report = probe.check().await;
            tracing::debug!(
                component = probe.name(),
                status = %report.status,
                "health probe"
            );
            self.latest.lock().insert(probe.name().to_string(), report);
        }
    }

    /// Probe on a fixed cadence until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(?interval, "health collector started");
        loop {
            self.run_once().await;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("health collector stopped");
    }

    /// Latest reports plus the worst-of aggregate.
    pub fn report(&self) -> (HealthStatus, HashMap<String, ComponentHealth>) {
        let latest = self.latest.lock().clone();
        let aggregate = latest
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Unknown);
        (aggregate, latest)
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
