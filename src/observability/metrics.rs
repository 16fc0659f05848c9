//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_allowed_total` (counter): allowed by resource
//! - `gateway_requests_limited_total` (counter): 429s by resource
//! - `gateway_requests_banned_total` (counter): rejections of banned clients
//! - `gateway_signature_failures_total` (counter): 401s by reason
//! - `gateway_tenant_resolved_total` (counter): resolutions by strategy
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Prometheus exposition on a dedicated listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_allowed(resource: &str) {
    metrics::counter!("gateway_requests_allowed_total", "resource" => resource.to_string())
        .increment(1);
}

pub fn record_rate_limited(resource: &str) {
    metrics::counter!("gateway_requests_limited_total", "resource" => resource.to_string())
        .increment(1);
}

pub fn record_banned() {
    metrics::counter!("gateway_requests_banned_total").increment(1);
}

pub fn record_signature_failure(reason: &'static str) {
    metrics::counter!("gateway_signature_failures_total", "reason" => reason).increment(1);
}

pub fn record_tenant_resolved(strategy: &'static str) {
    metrics::counter!("gateway_tenant_resolved_total", "strategy" => strategy).increment(1);
}
