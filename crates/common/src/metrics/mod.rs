//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all Transient metrics
pub const METRICS_PREFIX: &str = "transient";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for full graph rebuilds (database fetch included)
pub const REBUILD_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
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

    // Recommendation metrics
    describe_counter!(
        format!("{}_recommendations_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of recommendation requests"
    );

    describe_histogram!(
        format!("{}_propagation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Weight propagation latency in seconds"
    );

    describe_gauge!(
        format!("{}_recommendation_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of candidates returned by the last recommendation"
    );

    // Graph metrics
    describe_counter!(
        format!("{}_graph_rebuilds_total", METRICS_PREFIX),
        Unit::Count,
        "Total graph rebuild attempts"
    );

    describe_histogram!(
        format!("{}_graph_rebuild_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Graph rebuild latency in seconds"
    );

    describe_gauge!(
        format!("{}_graph_nodes", METRICS_PREFIX),
        Unit::Count,
        "Nodes in the published graph snapshot"
    );

    describe_gauge!(
        format!("{}_graph_edges", METRICS_PREFIX),
        Unit::Count,
        "Edges in the published graph snapshot"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_ingestion_events_total", METRICS_PREFIX),
        Unit::Count,
        "Total incremental node/edge events"
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

/// Helper to record recommendation metrics
pub fn record_recommendation(duration_secs: f64, result_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_recommendations_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(format!("{}_propagation_duration_seconds", METRICS_PREFIX))
            .record(duration_secs);

        gauge!(format!("{}_recommendation_results_count", METRICS_PREFIX))
            .set(result_count as f64);
    }
}

/// Helper to record a rebuild attempt
pub fn record_rebuild(duration_secs: f64, success: bool) {
    let outcome = if success { "success" } else { "error" };

    counter!(
        format!("{}_graph_rebuilds_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_graph_rebuild_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// Helper to record the size of the published snapshot
pub fn record_graph_size(nodes: usize, edges: usize) {
    gauge!(format!("{}_graph_nodes", METRICS_PREFIX)).set(nodes as f64);
    gauge!(format!("{}_graph_edges", METRICS_PREFIX)).set(edges as f64);
}

/// Helper to record an incremental ingestion event
pub fn record_ingestion(kind: &str, accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };

    counter!(
        format!("{}_ingestion_events_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
