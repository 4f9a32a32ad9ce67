//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Audience Forge metrics
pub const METRICS_PREFIX: &str = "audience";

/// Histogram buckets for index round trips (in seconds)
/// Targets: P50 < 50ms, P99 < 500ms
pub const INDEX_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms - P99 target
    1.000,  // 1s
    3.000,  // 3s - default per-call timeout
];

/// Buckets for extraction latency (LLM calls are slow)
pub const EXTRACTION_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Index metrics
    describe_counter!(
        format!("{}_index_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total search index queries"
    );

    describe_histogram!(
        format!("{}_index_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search index round trip latency in seconds"
    );

    // Extraction metrics
    describe_counter!(
        format!("{}_extraction_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total candidate extraction requests"
    );

    describe_histogram!(
        format!("{}_extraction_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Candidate extraction latency in seconds"
    );

    // Reconciliation metrics
    describe_counter!(
        format!("{}_reconciled_terms_total", METRICS_PREFIX),
        Unit::Count,
        "Total candidate terms reconciled, by outcome"
    );

    describe_counter!(
        format!("{}_compiled_rules_total", METRICS_PREFIX),
        Unit::Count,
        "Total filter rules compiled into queries"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one index round trip
pub fn record_index_query(op: &'static str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_index_queries_total", METRICS_PREFIX),
        "op" => op,
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_index_query_duration_seconds", METRICS_PREFIX),
        "op" => op
    )
    .record(duration_secs);
}

/// Helper to record extraction metrics
pub fn record_extraction(duration_secs: f64, role: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_extraction_requests_total", METRICS_PREFIX),
        "role" => role.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_extraction_duration_seconds", METRICS_PREFIX),
            "role" => role.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record the outcome of one reconciled term
pub fn record_reconciled_term(column: &str, outcome: &'static str) {
    counter!(
        format!("{}_reconciled_terms_total", METRICS_PREFIX),
        "column" => column.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to record compiled rule volume
pub fn record_compile(rule_count: usize) {
    counter!(format!("{}_compiled_rules_total", METRICS_PREFIX)).increment(rule_count as u64);
}
