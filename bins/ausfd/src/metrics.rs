//! Metrics
//!
//! Prometheus exposition on port 8080 and the counters the AUSF maintains.
//! Label cardinality is bounded: the result label is either AUTHORIZED or a
//! problem cause from the fixed set the procedures produce.

use std::net::SocketAddr;

use ::metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Port of the Prometheus text exposition.
pub const METRICS_PORT: u16 = 8080;

/// Install the Prometheus recorder and its HTTP listener on `:8080`.
pub fn init_metrics() -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], METRICS_PORT));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("could not install metrics exporter: {e}"))?;
    log::info!("metrics exposition listening on {addr}");
    Ok(())
}

/// Count a UE authentication attempt.
///
/// Metric: `ausf_ue_authentications_total`
/// Labels: `ausf_id`, `serving_network_name`, `auth_type`, `result`
pub fn increment_ue_auth_stats(
    ausf_id: &str,
    serving_network_name: &str,
    auth_type: &str,
    result: &str,
) {
    counter!("ausf_ue_authentications_total",
        "ausf_id" => ausf_id.to_string(),
        "serving_network_name" => serving_network_name.to_string(),
        "auth_type" => auth_type.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}
