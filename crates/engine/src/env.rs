// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.
//!
//! Cadence knobs fall back to their defaults on parse failure; only the
//! commit delay (owned by fleet-adapters) is validated strictly.

use std::time::Duration;

fn parse_secs_f64(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|s| *s > 0.0 && s.is_finite())
        .map(Duration::from_secs_f64)
}

/// Engine loop cadences and thresholds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheduler cadence (QUEUE_POLL_INTERVAL_SECONDS, default 1.0)
    pub poll_interval: Duration,
    /// Timeout monitor cadence (TIMEOUT_MONITOR_INTERVAL_SECONDS, default 10)
    pub monitor_interval: Duration,
    /// Cleaner cadence (CLEANER_INTERVAL_SECONDS, default 3600)
    pub cleaner_interval: Duration,
    /// Bridge heartbeat cadence (HEARTBEAT_INTERVAL_SECONDS, default 5)
    pub heartbeat_interval: Duration,
    /// Heartbeat staleness before OFFLINE (OFFLINE_HEARTBEAT_TIMEOUT_SECONDS, default 30)
    pub offline_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(10),
            cleaner_interval: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(5),
            offline_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load from the environment, keeping defaults for anything unset or
    /// unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: parse_secs_f64("QUEUE_POLL_INTERVAL_SECONDS")
                .unwrap_or(defaults.poll_interval),
            monitor_interval: parse_secs_f64("TIMEOUT_MONITOR_INTERVAL_SECONDS")
                .unwrap_or(defaults.monitor_interval),
            cleaner_interval: parse_secs_f64("CLEANER_INTERVAL_SECONDS")
                .unwrap_or(defaults.cleaner_interval),
            heartbeat_interval: parse_secs_f64("HEARTBEAT_INTERVAL_SECONDS")
                .unwrap_or(defaults.heartbeat_interval),
            offline_timeout: parse_secs_f64("OFFLINE_HEARTBEAT_TIMEOUT_SECONDS")
                .unwrap_or(defaults.offline_timeout),
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
