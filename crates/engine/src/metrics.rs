// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counter/gauge/histogram registry with Prometheus text exposition.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Histogram bucket upper bounds, in seconds.
const DURATION_BUCKETS: [f64; 10] = [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0];

/// Fully-qualified sample key: metric name plus sorted label pairs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SampleKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl SampleKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }

    fn render_labels(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        format!("{{{}}}", inner.join(","))
    }

    fn render_labels_with(&self, extra_key: &str, extra_val: &str) -> String {
        let mut pairs: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        pairs.push(format!("{}=\"{}\"", extra_key, extra_val));
        format!("{{{}}}", pairs.join(","))
    }
}

#[derive(Debug, Clone)]
struct Histogram {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            bucket_counts: vec![0; DURATION_BUCKETS.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        for (i, le) in DURATION_BUCKETS.iter().enumerate() {
            if value <= *le {
                self.bucket_counts[i] += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Default)]
struct Inner {
    counters: BTreeMap<SampleKey, u64>,
    gauges: BTreeMap<SampleKey, f64>,
    histograms: BTreeMap<SampleKey, Histogram>,
}

/// Shared metrics registry. Clones share state.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &str, labels: &[(&str, &str)], delta: u64) {
        let mut inner = self.inner.lock();
        *inner.counters.entry(SampleKey::new(name, labels)).or_insert(0) += delta;
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let mut inner = self.inner.lock();
        inner.gauges.insert(SampleKey::new(name, labels), value);
    }

    pub fn observe_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let mut inner = self.inner.lock();
        inner
            .histograms
            .entry(SampleKey::new(name, labels))
            .or_insert_with(Histogram::new)
            .observe(value);
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.inner
            .lock()
            .counters
            .get(&SampleKey::new(name, labels))
            .copied()
            .unwrap_or(0)
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.inner.lock().gauges.get(&SampleKey::new(name, labels)).copied()
    }

    /// Render every sample in the text exposition format.
    ///
    /// Keys are BTreeMap-ordered, so the output is deterministic.
    pub fn render_text(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        let mut last_name = String::new();

        for (key, value) in &inner.counters {
            if key.name != last_name {
                let _ = writeln!(out, "# TYPE {} counter", key.name);
                last_name = key.name.clone();
            }
            let _ = writeln!(out, "{}{} {}", key.name, key.render_labels(), value);
        }

        last_name.clear();
        for (key, value) in &inner.gauges {
            if key.name != last_name {
                let _ = writeln!(out, "# TYPE {} gauge", key.name);
                last_name = key.name.clone();
            }
            let _ = writeln!(out, "{}{} {}", key.name, key.render_labels(), value);
        }

        last_name.clear();
        for (key, histogram) in &inner.histograms {
            if key.name != last_name {
                let _ = writeln!(out, "# TYPE {} histogram", key.name);
                last_name = key.name.clone();
            }
            // bucket counts are kept cumulative at observe time
            for (i, le) in DURATION_BUCKETS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{}_bucket{} {}",
                    key.name,
                    key.render_labels_with("le", &format!("{}", le)),
                    histogram.bucket_counts[i]
                );
            }
            let _ = writeln!(
                out,
                "{}_bucket{} {}",
                key.name,
                key.render_labels_with("le", "+Inf"),
                histogram.count
            );
            let _ = writeln!(out, "{}_sum{} {}", key.name, key.render_labels(), histogram.sum);
            let _ = writeln!(out, "{}_count{} {}", key.name, key.render_labels(), histogram.count);
        }

        out
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
