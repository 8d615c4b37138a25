//! Default metrics sink.
//!
//! Emits every observation as a structured tracing event and mirrors
//! counters/gauges into an in-process registry. The registry is what the
//! progress endpoint and the integration tests read; a real collector can
//! replace this sink without touching the core.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::ports::metrics::{Labels, MetricsSink};

#[derive(Default)]
struct Registry {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
    histograms: HashMap<String, Vec<f64>>,
}

/// Tracing-backed sink with a readable registry.
#[derive(Default)]
pub struct TracingMetricsSink {
    registry: Mutex<Registry>,
}

impl TracingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn labeled_key(name: &str, labels: Labels<'_>) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        let mut key = String::from(name);
        for (k, v) in labels {
            key.push_str(&format!("{{{k}={v}}}"));
        }
        key
    }

    /// Current value of a counter, summed across label sets.
    pub fn counter_value(&self, name: &str) -> u64 {
        let registry = self.registry.lock().expect("metrics registry poisoned");
        registry
            .counters
            .iter()
            .filter(|(k, _)| k.as_str() == name || k.starts_with(&format!("{name}{{")))
            .map(|(_, v)| v)
            .sum()
    }

    /// Current value of a gauge.
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        let registry = self.registry.lock().expect("metrics registry poisoned");
        registry.gauges.get(name).copied()
    }

    /// All observations recorded into a histogram.
    pub fn histogram_values(&self, name: &str) -> Vec<f64> {
        let registry = self.registry.lock().expect("metrics registry poisoned");
        registry.histograms.get(name).cloned().unwrap_or_default()
    }
}

impl MetricsSink for TracingMetricsSink {
    fn incr_counter(&self, name: &'static str, value: u64, labels: Labels<'_>) {
        tracing::debug!(metric = name, value, ?labels, "counter");
        let mut registry = self.registry.lock().expect("metrics registry poisoned");
        *registry
            .counters
            .entry(Self::labeled_key(name, labels))
            .or_insert(0) += value;
    }

    fn observe_histogram(&self, name: &'static str, value: f64) {
        tracing::debug!(metric = name, value, "histogram");
        let mut registry = self.registry.lock().expect("metrics registry poisoned");
        registry
            .histograms
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        tracing::debug!(metric = name, value, "gauge");
        let mut registry = self.registry.lock().expect("metrics registry poisoned");
        registry.gauges.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates_across_labels() {
        let sink = TracingMetricsSink::new();
        sink.incr_counter("task_retries_total", 1, &[("kind", "transient")]);
        sink.incr_counter("task_retries_total", 2, &[("kind", "recoverable_code")]);
        sink.incr_counter("task_retries_total", 1, &[]);
        assert_eq!(sink.counter_value("task_retries_total"), 4);
    }

    #[test]
    fn test_gauge_overwrites() {
        let sink = TracingMetricsSink::new();
        sink.set_gauge("active_file_locks", 3.0);
        sink.set_gauge("active_file_locks", 1.0);
        assert_eq!(sink.gauge_value("active_file_locks"), Some(1.0));
    }

    #[test]
    fn test_histogram_collects_observations() {
        let sink = TracingMetricsSink::new();
        sink.observe_histogram("conflict_similarity", 0.6);
        sink.observe_histogram("conflict_similarity", 0.9);
        assert_eq!(sink.histogram_values("conflict_similarity"), vec![0.6, 0.9]);
    }
}
