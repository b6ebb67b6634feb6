//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Requests dispatched total (counter, labels: route).
pub const GATEWAY_REQUESTS_TOTAL: &str = "gateway_requests_total";
/// Requests halted by the auth gate total (counter).
pub const GATEWAY_UNAUTHORIZED_TOTAL: &str = "gateway_unauthorized_total";
/// Requests matching no route total (counter).
pub const GATEWAY_NOT_FOUND_TOTAL: &str = "gateway_not_found_total";
/// Upstream transport failures total (counter, labels: upstream).
pub const GATEWAY_UPSTREAM_ERRORS_TOTAL: &str = "gateway_upstream_errors_total";
/// Identity checks total (counter, labels: outcome).
pub const AUTH_CHECKS_TOTAL: &str = "auth_checks_total";
/// WebSocket relays started total (counter, labels: route).
pub const WS_RELAYS_TOTAL: &str = "ws_relays_total";
/// Active WebSocket relays (gauge).
pub const WS_RELAYS_ACTIVE: &str = "ws_relays_active";
