// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    first = { 1, 2 },
    second = { 2, 4 },
    third = { 3, 8 },
    fifth = { 5, 32 },
    capped = { 6, 60 },
    deep = { 20, 60 },
    overflow_guard = { 200, 60 },
)]
fn base_follows_exponential_curve(retry: u32, expected_secs: u64) {
    assert_eq!(base_backoff(retry).as_secs(), expected_secs);
}

#[test]
fn jitter_stays_within_half_to_one_and_a_half() {
    for retry in 1..=6 {
        let base = base_backoff(retry).as_millis() as u64;
        for _ in 0..50 {
            let jittered = retry_backoff(retry).as_millis() as u64;
            assert!(jittered >= base / 2, "jitter below -50%: {}ms", jittered);
            assert!(jittered <= base + base / 2, "jitter above +50%: {}ms", jittered);
        }
    }
}
