//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stack_requests_total` (counter): requests by method, status
//! - `stack_request_duration_seconds` (histogram): latency distribution
//! - `stack_output_rewrites_total` (counter): rewrite outcomes
//! - `stack_dns_lookups_total` (counter): lookups by record kind, outcome
//! - `stack_discovery_cache_total` (counter): hit / miss / unavailable
//! - `stack_queries_routed_total` (counter): replica vs. primary
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op, so tests and the CLI pay nothing

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "stack_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("stack_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rewrite(outcome: &'static str) {
    counter!("stack_output_rewrites_total", "outcome" => outcome).increment(1);
}

pub fn record_dns_lookup(kind: &'static str, outcome: &'static str) {
    counter!("stack_dns_lookups_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_discovery_cache(result: &'static str) {
    counter!("stack_discovery_cache_total", "result" => result).increment(1);
}

pub fn record_query_route(target: &'static str) {
    counter!("stack_queries_routed_total", "target" => target).increment(1);
}
