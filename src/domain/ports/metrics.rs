//! Metrics sink port.
//!
//! The collector transport is swappable; the core emits a fixed metric set
//! through this interface. The default implementation lives in
//! `infrastructure::metrics` and doubles as an in-process registry the
//! progress API and tests read from.

/// Metric names the orchestrator emits.
pub mod names {
    pub const WORKFLOWS_COMPLETED: &str = "workflows_completed";
    pub const WORKFLOWS_FAILED: &str = "workflows_failed";
    pub const WORKFLOW_DURATION_SECONDS: &str = "workflow_duration_seconds";
    pub const TASK_RETRIES_TOTAL: &str = "task_retries_total";
    pub const STACK_CONFIDENCE: &str = "stack_confidence";
    pub const CONFLICTS_DETECTED: &str = "conflicts_detected";
    pub const CONFLICTS_RESOLVED: &str = "conflicts_resolved";
    pub const CONFLICT_SIMILARITY: &str = "conflict_similarity";
    pub const VISUAL_DIFF_SCORE: &str = "visual_diff_score";
    pub const TOKENS_USED: &str = "openrouter_tokens_used";
    pub const ACTIVE_FILE_LOCKS: &str = "active_file_locks";
}

/// Label set attached to a counter increment.
pub type Labels<'a> = &'a [(&'static str, &'a str)];

/// Abstract metrics transport.
pub trait MetricsSink: Send + Sync {
    /// Increment a counter.
    fn incr_counter(&self, name: &'static str, value: u64, labels: Labels<'_>);

    /// Record one observation into a histogram.
    fn observe_histogram(&self, name: &'static str, value: f64);

    /// Set a gauge to an absolute value.
    fn set_gauge(&self, name: &'static str, value: f64);
}

/// A sink that drops everything. Useful in unit tests that do not assert
/// on metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn incr_counter(&self, _name: &'static str, _value: u64, _labels: Labels<'_>) {}
    fn observe_histogram(&self, _name: &'static str, _value: f64) {}
    fn set_gauge(&self, _name: &'static str, _value: f64) {}
}
