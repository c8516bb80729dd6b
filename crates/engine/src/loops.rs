// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background loops for the queue: scheduler, monitor, cleaner.
//!
//! Each loop is one tokio task with a shared `watch` shutdown signal.

use crate::env::EngineConfig;
use crate::queue::TaskQueue;
use fleet_core::{Clock, IdGen};
use std::sync::Arc;
use tokio::sync::watch;

/// Wait one interval tick, returning false if shutdown fired first.
async fn tick(interval: std::time::Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = shutdown.changed() => false,
    }
}

/// Promote delayed tasks once per poll interval.
pub async fn run_scheduler<C: Clock, G: IdGen>(
    queue: Arc<TaskQueue<C, G>>,
    config: EngineConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval = ?config.poll_interval, "scheduler loop started");
    while tick(config.poll_interval, &mut shutdown).await {
        if let Err(e) = queue.promote_due() {
            tracing::error!(error = %e, "scheduler tick failed");
        }
        queue.update_gauges();
    }
    tracing::info!("scheduler loop stopped");
}

/// Time out stuck in-flight tasks and sweep stale agents.
pub async fn run_monitor<C: Clock, G: IdGen>(
    queue: Arc<TaskQueue<C, G>>,
    config: EngineConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval = ?config.monitor_interval, "monitor loop started");
    while tick(config.monitor_interval, &mut shutdown).await {
        let timed_out = queue.check_timeouts();
        if !timed_out.is_empty() {
            tracing::warn!(count = timed_out.len(), "timed out in-flight tasks");
        }
        queue.sweep_offline_agents();
    }
    tracing::info!("monitor loop stopped");
}

/// Evict expired terminal records on a slow cadence.
pub async fn run_cleaner<C: Clock, G: IdGen>(
    queue: Arc<TaskQueue<C, G>>,
    config: EngineConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval = ?config.cleaner_interval, "cleaner loop started");
    while tick(config.cleaner_interval, &mut shutdown).await {
        queue.clean_expired();
    }
    tracing::info!("cleaner loop stopped");
}
