//! Prometheus exporter and metric names.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::error::ServerError;

/// Install the global Prometheus recorder with its own HTTP scrape listener.
///
/// Must be called from within a Tokio runtime, once, before any metrics are
/// recorded.
pub fn install_exporter(listen_addr: &str) -> Result<SocketAddr, ServerError> {
    let addr: SocketAddr = listen_addr
        .parse()
        .map_err(|_| ServerError::InvalidAddress(listen_addr.to_string()))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!(%addr, "prometheus exporter listening");
    Ok(addr)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrades refused before the handshake (counter, labels: reason).
pub const WS_UPGRADES_REJECTED_TOTAL: &str = "ws_upgrades_rejected_total";
/// Connections closed because their outbound queue was full (counter).
pub const WS_QUEUE_FULL_CLOSES_TOTAL: &str = "ws_queue_full_closes_total";
/// Connections closed for missing heartbeats (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "ws_heartbeat_timeouts_total";
/// Inbound frames handled by the hub (counter).
pub const CHAT_FRAMES_TOTAL: &str = "chat_frames_total";
/// Outbound events emitted by the hub (counter, labels: event).
pub const CHAT_EVENTS_TOTAL: &str = "chat_events_total";
/// Inbound events rejected (counter, labels: code).
pub const CHAT_REJECTIONS_TOTAL: &str = "chat_rejections_total";
/// Accepted replies whose parent had left history (counter).
pub const CHAT_ORPHANED_REPLIES_TOTAL: &str = "chat_orphaned_replies_total";
/// Messages retained in history (gauge).
pub const CHAT_HISTORY_SIZE: &str = "chat_history_size";
/// Distinct users present (gauge).
pub const CHAT_PRESENT_USERS: &str = "chat_present_users";
/// Time spent processing one hub command (histogram).
pub const HUB_COMMAND_DURATION_SECONDS: &str = "hub_command_duration_seconds";
