// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry backoff: `min(2^n, 60)` seconds with +/-50% jitter.
//!
//! The queue is the only layer that retries a task; bridges never re-deliver
//! an attempt on their own.

use rand::Rng;
use std::time::Duration;

/// Cap on the exponential curve.
const MAX_BACKOFF_SECS: u64 = 60;

/// Deterministic base: `min(2^n, 60)` seconds for the nth retry.
pub fn base_backoff(retry_count: u32) -> Duration {
    let secs = 2u64
        .checked_pow(retry_count)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// Base backoff with +/-50% jitter applied, so retry herds spread out.
pub fn retry_backoff(retry_count: u32) -> Duration {
    let base = base_backoff(retry_count).as_millis() as u64;
    let jitter = rand::rng().random_range(0..=base);
    // base/2 + [0, base] spans 50%..150% of base
    Duration::from_millis(base / 2 + jitter)
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
