//! `ChatServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use parking_lot::Mutex;
use parley_core::{ChatHub, ConnectionId};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_UPGRADES_REJECTED_TOTAL;
use crate::origin::OriginPolicy;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::{ClientConnection, ConnectionSlots};
use crate::websocket::hub::{HubHandle, spawn_hub};
use crate::websocket::session::{HeartbeatConfig, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sender side of the hub actor.
    pub hub: HubHandle,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Which origins may upgrade.
    pub origins: Arc<OriginPolicy>,
    /// Connection limit.
    pub slots: Arc<ConnectionSlots>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

/// The chat relay server.
pub struct ChatServer {
    config: Arc<ServerConfig>,
    hub: HubHandle,
    hub_task: Mutex<Option<JoinHandle<()>>>,
    origins: Arc<OriginPolicy>,
    slots: Arc<ConnectionSlots>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ChatServer {
    /// Create a server and start its hub actor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let hub = ChatHub::new(config.history_capacity, config.limits);
        let (hub_handle, hub_task) = spawn_hub(hub, shutdown.token());
        Self {
            origins: Arc::new(OriginPolicy::from_patterns(&config.allowed_origins)),
            slots: Arc::new(ConnectionSlots::new(config.max_connections)),
            config: Arc::new(config),
            hub: hub_handle,
            hub_task: Mutex::new(Some(hub_task)),
            shutdown,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            shutdown: Arc::clone(&self.shutdown),
            origins: Arc::clone(&self.origins),
            slots: Arc::clone(&self.slots),
            config: Arc::clone(&self.config),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(self.origins.cors_layer())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    /// The task finishes after [`ShutdownCoordinator::shutdown`] is called.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = result {
                error!(error = %err, "server terminated with error");
            }
        });

        info!(%local_addr, "parley server listening");
        Ok((local_addr, handle))
    }

    /// Signal shutdown and wait for the server task and the hub actor.
    pub async fn stop(&self, server_task: JoinHandle<()>) {
        let mut handles = vec![server_task];
        if let Some(hub_task) = self.hub_task.lock().take() {
            handles.push(hub_task);
        }
        self.shutdown.graceful_shutdown(handles, None).await;
    }

    /// Get the hub handle.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.slots.active()
    }
}

/// GET /health
async fn health_handler() -> Json<HealthResponse> {
    Json(health::health_check())
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin) {
        warn!(origin, "websocket origin not allowed");
        counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => "origin").increment(1);
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    if state.shutdown.is_shutting_down() {
        counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => "shutdown").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(slot) = state.slots.try_acquire() else {
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached"
        );
        counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let config = Arc::clone(&state.config);
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let (send_tx, send_rx) = mpsc::channel(config.send_queue_capacity);
            let connection = Arc::new(ClientConnection::new(ConnectionId::new(), send_tx));
            let heartbeat = HeartbeatConfig {
                interval: config.heartbeat_interval(),
                timeout: config.heartbeat_timeout(),
            };
            run_ws_session(
                socket,
                connection,
                send_rx,
                state.hub,
                heartbeat,
                state.shutdown.token(),
            )
            .await;
        })
}
