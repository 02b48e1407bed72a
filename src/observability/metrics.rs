//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): server exchanges by method, status
//! - `http_request_duration_seconds` (histogram): exchange latency
//! - `http_sessions_created_total` (counter): sessions allocated by the pool
//! - `http_sessions_reused_total` (counter): sessions handed out again
//! - `http_client_requests_total` (counter): client round trips by status
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed, so library users pay nothing unless they opt in.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_session(reused: bool) {
    if reused {
        metrics::counter!("http_sessions_reused_total").increment(1);
    } else {
        metrics::counter!("http_sessions_created_total").increment(1);
    }
}

pub fn record_client_request(status: u16) {
    metrics::counter!("http_client_requests_total", "status" => status.to_string()).increment(1);
}
