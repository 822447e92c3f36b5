//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_guarded_calls_total` (counter): guarded calls by operation, outcome
//! - `gateway_breaker_transitions_total` (counter): state changes by operation, from, to
//! - `gateway_breaker_rejections_total` (counter): fast-fail rejections by operation
//! - `gateway_retries_total` (counter): retried idempotent calls by operation
//! - `gateway_rate_limited_total` (counter): requests refused by the rate limiter
//! - `gateway_sagas_total` (counter): saga executions by saga, outcome
//! - `gateway_compensation_failures_total` (counter): failed rollbacks by saga, step
//! - `gateway_broadcast_deliveries_total` (counter): messages handed to mailboxes
//! - `gateway_ws_connections` (gauge): open WebSocket sessions
//!
//! # Design Decisions
//! - Uses the `metrics` facade; recording is a no-op until a recorder is installed
//! - Prometheus exporter only when enabled in config

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(operation: &str, outcome: &'static str) {
    counter!(
        "gateway_guarded_calls_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_breaker_transition(operation: &str, from: &'static str, to: &'static str) {
    counter!(
        "gateway_breaker_transitions_total",
        "operation" => operation.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_breaker_rejection(operation: &str) {
    counter!("gateway_breaker_rejections_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_retry(operation: &str) {
    counter!("gateway_retries_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_saga(saga: &str, outcome: &'static str) {
    counter!("gateway_sagas_total", "saga" => saga.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_compensation_failure(saga: &str, step: &str) {
    counter!(
        "gateway_compensation_failures_total",
        "saga" => saga.to_string(),
        "step" => step.to_string()
    )
    .increment(1);
}

pub fn record_broadcast(delivered: usize) {
    counter!("gateway_broadcast_deliveries_total").increment(delivered as u64);
}

pub fn record_ws_connections(open: usize) {
    gauge!("gateway_ws_connections").set(open as f64);
}
