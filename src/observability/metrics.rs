//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_datagrams_received_total` (counter): datagrams read from clients
//! - `relay_datagrams_forwarded_total` (counter): fan-out sends by destination, result
//! - `relay_replies_total` (counter): replies relayed back to clients
//! - `relay_active_sessions` (gauge): live sessions
//! - `relay_destinations` (gauge): size of the committed snapshot
//! - `relay_commits_total` (counter): registry commits by proposal source
//! - `relay_probes_total` (counter): health probes by destination, outcome
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_datagram_received(bytes: usize) {
    counter!("relay_datagrams_received_total").increment(1);
    counter!("relay_bytes_received_total").increment(bytes as u64);
}

pub fn record_forward(destination: &str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!(
        "relay_datagrams_forwarded_total",
        "destination" => destination.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_reply(destination: &str) {
    counter!("relay_replies_total", "destination" => destination.to_string()).increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!("relay_active_sessions").set(count as f64);
}

pub fn set_destinations(count: usize) {
    gauge!("relay_destinations").set(count as f64);
}

pub fn record_commit(source: &'static str) {
    counter!("relay_commits_total", "source" => source).increment(1);
}

pub fn record_probe(destination: &str, healthy: bool) {
    counter!(
        "relay_probes_total",
        "destination" => destination.to_string(),
        "healthy" => if healthy { "true" } else { "false" }
    )
    .increment(1);
}
