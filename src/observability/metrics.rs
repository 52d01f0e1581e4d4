//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cas_gate_requests_total` (counter): requests by method, status, route
//! - `cas_gate_request_duration_seconds` (histogram): time to resolve a request
//! - `cas_gate_auth_total` (counter): handshake outcomes
//! - `cas_gate_sessions` (gauge): entries in the session cache

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &'static str, start: Instant) {
    counter!(
        "cas_gate_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route
    )
    .increment(1);
    histogram!("cas_gate_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_auth(outcome: &'static str) {
    counter!("cas_gate_auth_total", "outcome" => outcome).increment(1);
}

pub fn record_session_count(count: usize) {
    gauge!("cas_gate_sessions").set(count as f64);
}
