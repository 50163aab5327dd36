//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_selection_total` (counter): selections by outcome
//!   (`matched`, `miss`, `ambiguous`)
//! - `dispatch_filter_short_circuit_total` (counter): short-circuits by stage
//! - `dispatch_invocations_total` (counter): invocations by outcome
//! - `dispatch_invocation_duration_seconds` (histogram): pipeline latency
//! - `dispatch_requests_total` (counter): HTTP responses by method and status
//! - `dispatch_descriptor_version` / `dispatch_descriptor_count` (gauges)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_selection(outcome: &'static str) {
    ::metrics::counter!("dispatch_selection_total", "outcome" => outcome).increment(1);
}

pub fn record_short_circuit(stage: &'static str) {
    ::metrics::counter!("dispatch_filter_short_circuit_total", "stage" => stage).increment(1);
}

pub fn record_invocation(outcome: &'static str, start: Instant) {
    ::metrics::counter!("dispatch_invocations_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("dispatch_invocation_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_request(method: &str, status: u16) {
    ::metrics::counter!(
        "dispatch_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_snapshot_published(version: u64, actions: usize) {
    ::metrics::gauge!("dispatch_descriptor_version").set(version as f64);
    ::metrics::gauge!("dispatch_descriptor_count").set(actions as f64);
}
