//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names shared across crates.

/// Subscriptions accepted (counter).
pub const BROKER_SUBSCRIPTIONS_TOTAL: &str = "broker_subscriptions_total";
/// Active broker clients (gauge).
pub const BROKER_CLIENTS_ACTIVE: &str = "broker_clients_active";
/// Publishes attempted (counter).
pub const BROKER_PUBLISHES_TOTAL: &str = "broker_publishes_total";
/// Failed publishes (counter, labels: code).
pub const BROKER_PUBLISH_ERRORS_TOTAL: &str = "broker_publish_errors_total";
/// Outstanding correlated requests (gauge).
pub const BROKER_PENDING_REQUESTS: &str = "broker_pending_requests";
/// Frame connections opened (counter).
pub const FRAME_CONNECTIONS_TOTAL: &str = "frame_connections_total";
/// Open frame connections (gauge).
pub const FRAME_CONNECTIONS_ACTIVE: &str = "frame_connections_active";
/// Envelopes dropped on a full or closed outbound queue (counter).
pub const FRAME_OUTBOUND_DROPS_TOTAL: &str = "frame_outbound_drops_total";
/// Frame connection lifetime (histogram).
pub const FRAME_CONNECTION_DURATION_SECONDS: &str = "frame_connection_duration_seconds";
/// Upgrades and inbound frames refused for an unaccepted origin (counter).
pub const FRAME_ORIGIN_REJECTIONS_TOTAL: &str = "frame_origin_rejections_total";
