//! Prometheus metrics exposition
//!
//! The library emits its flow counters through the `metrics` facade; this
//! module installs the recorder that turns them into `/metrics` output and
//! adds one counter of its own:
//!
//! - `oauthorizer_http_requests_total` (counter): labels `route`, `status`

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a handled request with its route and response status.
pub fn record_request(route: &'static str, status: u16) {
    metrics::counter!("oauthorizer_http_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
}
