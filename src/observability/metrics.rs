//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (RPS, latency, errors, connections)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `proxy_requests_total` (counter): total requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_rate_limited_total` (counter): rejected by the rate limiter
//! - `proxy_access_log_dropped_total` (counter): log entries shed under backpressure
//! - `proxy_active_connections` (gauge): currently accepted connections

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
///
/// Failures are logged, not fatal: metrics are an observer, the proxy
/// serves regardless.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics endpoint"),
    }
}

/// Record a completed (or failed) request.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string(),
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a rate-limited rejection.
pub fn record_rate_limited(reason: &'static str) {
    metrics::counter!("proxy_rate_limited_total", "reason" => reason).increment(1);
}

/// Record an access log entry shed under backpressure.
pub fn record_access_log_dropped() {
    metrics::counter!("proxy_access_log_dropped_total").increment(1);
}

/// Track the number of currently accepted connections.
pub fn record_active_connections(count: usize) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}
