//! Metrics collection and exposition.
//!
//! # Metrics
//! - `connector_requests_total` (counter): requests by route, status
//! - `connector_request_duration_seconds` (histogram): latency by route
//! - `connector_gate_denials_total` (counter): rejections by gate, reason
//! - `connector_rate_limited_total` (counter): 429s by route
//! - `connector_snapshot_cache_total` (counter): cache lookups by result
//! - `connector_cache_purges_total` (counter): purges by triggering event
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    ::metrics::counter!(
        "connector_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("connector_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_gate_denial(gate: &'static str, reason: &'static str) {
    ::metrics::counter!(
        "connector_gate_denials_total",
        "gate" => gate,
        "reason" => reason
    )
    .increment(1);
}

pub fn record_rate_limited(route: &'static str) {
    ::metrics::counter!("connector_rate_limited_total", "route" => route).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    ::metrics::counter!("connector_snapshot_cache_total", "result" => result).increment(1);
}

pub fn record_cache_purge(event: &'static str) {
    ::metrics::counter!("connector_cache_purges_total", "event" => event).increment(1);
}
