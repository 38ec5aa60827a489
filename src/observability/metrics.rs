//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hedge_attempts_total` (counter): attempts by outcome (success, failure, timeout)
//! - `hedge_races_total` (counter): races by outcome (success, failure)
//! - `hedge_race_duration_seconds` (histogram): time until the race resolved
//! - `hedge_relay_chunks_total` (counter): streamed chunks relayed to callers

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(outcome: &'static str) {
    counter!("hedge_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_race(outcome: &'static str, start: Instant) {
    counter!("hedge_races_total", "outcome" => outcome).increment(1);
    histogram!("hedge_race_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_relay_chunk() {
    counter!("hedge_relay_chunks_total").increment(1);
}
