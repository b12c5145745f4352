//! Metrics collection and exposition.
//!
//! # Metrics
//! - `chaos_proxy_requests_total` (counter): requests by method, status
//! - `chaos_proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `chaos_proxy_ghost_responses_total` / `_ghost_misses_total` (counter)
//! - `chaos_proxy_canary_requests_total` (counter)
//! - `chaos_proxy_injected_failures_total` (counter)
//! - `chaos_proxy_injected_latency_seconds` (histogram): by source
//! - `chaos_proxy_rate_limited_total`, `chaos_proxy_blocked_total` (counter)
//! - `chaos_proxy_store_errors_total` (counter): by store operation
//! - `chaos_proxy_traffic_logs_total`, `chaos_proxy_fuzz_requests_total` (counter): by outcome
//! - `chaos_proxy_background_dropped_total` (counter): by task
//!
//! Recording is a no-op until a recorder is installed, so these helpers are
//! safe to call from tests and from binaries with metrics disabled.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "chaos_proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("chaos_proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_store_error(op: &'static str) {
    counter!("chaos_proxy_store_errors_total", "op" => op).increment(1);
}

pub fn record_injected_latency(source: &'static str, delay: Duration) {
    histogram!("chaos_proxy_injected_latency_seconds", "source" => source).record(delay.as_secs_f64());
}

pub fn record_injected_failure() {
    counter!("chaos_proxy_injected_failures_total").increment(1);
}

pub fn record_ghost_response() {
    counter!("chaos_proxy_ghost_responses_total").increment(1);
}

pub fn record_ghost_miss() {
    counter!("chaos_proxy_ghost_misses_total").increment(1);
}

pub fn record_canary() {
    counter!("chaos_proxy_canary_requests_total").increment(1);
}

pub fn record_rate_limited() {
    counter!("chaos_proxy_rate_limited_total").increment(1);
}

pub fn record_blocked() {
    counter!("chaos_proxy_blocked_total").increment(1);
}

/// `outcome`: published, skipped_sensitive, failed.
pub fn record_traffic_log(outcome: &'static str) {
    counter!("chaos_proxy_traffic_logs_total", "outcome" => outcome).increment(1);
}

/// `outcome`: ok, server_error, failed.
pub fn record_fuzz(outcome: &'static str) {
    counter!("chaos_proxy_fuzz_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_background_dropped(task: &'static str) {
    counter!("chaos_proxy_background_dropped_total", "task" => task).increment(1);
}
