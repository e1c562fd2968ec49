//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_rejections_total` (counter): rejected requests by code and stage
//! - `guard_security_events_total` (counter): reported events by kind
//! - `guard_sweep_evictions_total` (counter): records evicted by store
//! - `guard_store_entries` (gauge): live records by store
//!
//! # Design Decisions
//! - Updates are cheap and never fail; without an installed recorder they
//!   are no-ops, which keeps unit tests free of global setup

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rejection(code: &'static str, stage: &'static str) {
    counter!("guard_rejections_total", "code" => code, "stage" => stage).increment(1);
}

pub fn record_security_event(kind: &'static str) {
    counter!("guard_security_events_total", "kind" => kind).increment(1);
}

pub fn record_sweep(store: &'static str, evicted: usize, remaining: usize) {
    counter!("guard_sweep_evictions_total", "store" => store).increment(evicted as u64);
    gauge!("guard_store_entries", "store" => store).set(remaining as f64);
}
