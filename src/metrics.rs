//! Prometheus metrics for bucketroute.
//!
//! Defines metric name constants and installs a global Prometheus
//! recorder using `metrics-exporter-prometheus`.  Without an installed
//! recorder every `counter!`/`gauge!` call is a no-op, so library users
//! that do not care about metrics pay nothing.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Regional clients created (counter). Labels: region.
pub const CLIENTS_PROVISIONED_TOTAL: &str = "bucketroute_clients_provisioned_total";

/// Bucket resolutions (counter). Labels: outcome (hit, provisioned, error).
pub const REGION_RESOLUTIONS_TOTAL: &str = "bucketroute_region_resolutions_total";

/// Storage RPCs issued (counter). Labels: operation, outcome.
pub const RPC_TOTAL: &str = "bucketroute_rpc_total";

/// Clients currently pooled by the most recently mutated session (gauge).
pub const POOLED_CLIENTS: &str = "bucketroute_pooled_clients";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(CLIENTS_PROVISIONED_TOTAL, "Regional clients created");
    describe_counter!(
        REGION_RESOLUTIONS_TOTAL,
        "Bucket-to-client resolutions by outcome"
    );
    describe_counter!(RPC_TOTAL, "Storage RPCs by operation and outcome");
    describe_gauge!(POOLED_CLIENTS, "Clients held in the session pool");
}

/// Render the Prometheus exposition text, if the recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Outcome label for an RPC with the given HTTP status.
pub fn outcome_label(status: Option<http::StatusCode>) -> &'static str {
    match status {
        Some(s) if s.is_success() => "ok",
        Some(s) if s.is_redirection() => "redirect",
        Some(s) if s.is_client_error() => "client_error",
        Some(_) => "server_error",
        None => "transport_error",
    }
}
