//! Metrics collection and exposition.
//!
//! # Metrics
//! - `teeproxy_requests_total` (counter): relayed primary responses by status
//! - `teeproxy_request_duration_seconds` (histogram): client-facing latency
//! - `teeproxy_primary_failures_total` (counter): aborted requests by kind
//! - `teeproxy_shadow_dispatches_total` (counter): shadow outcomes
//! - `teeproxy_session_lookups_total` (counter): cache hit/miss
//! - `teeproxy_session_cache_entries` (gauge): stored mappings
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, start: Instant) {
    counter!("teeproxy_requests_total", "status" => status.to_string()).increment(1);
    histogram!("teeproxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_primary_failure(kind: &'static str) {
    counter!("teeproxy_primary_failures_total", "kind" => kind).increment(1);
}

pub fn record_shadow(outcome: &'static str) {
    counter!("teeproxy_shadow_dispatches_total", "outcome" => outcome).increment(1);
}

pub fn record_session_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("teeproxy_session_lookups_total", "result" => result).increment(1);
}

pub fn record_session_cache_size(size: usize) {
    gauge!("teeproxy_session_cache_entries").set(size as f64);
}
