//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status, target
//! - `proxy_request_duration_seconds` (histogram): upstream latency by target
//! - `proxy_upstream_errors_total` (counter): transport failures by target
//! - `proxy_skipped_total` (counter): requests bypassed by the skip predicate

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_forward(method: &str, status: u16, target: &str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "target" => target.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "target" => target.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(target: &str) {
    metrics::counter!("proxy_upstream_errors_total", "target" => target.to_string()).increment(1);
}

pub fn record_skipped() {
    metrics::counter!("proxy_skipped_total").increment(1);
}
