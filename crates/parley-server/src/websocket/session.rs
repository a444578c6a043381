//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::hub::HubHandle;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_HEARTBEAT_TIMEOUTS_TOTAL,
};

/// How long the writer gets to flush a close frame after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Ping cadence and dead-peer deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between server-initiated Ping frames.
    pub interval: Duration,
    /// Close after this long without a pong or any inbound frame.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub
/// 2. Forwards inbound text and UTF-8 binary frames to the hub
/// 3. Drains the outbound queue into the socket and sends periodic pings
/// 4. Reports the disconnect to the hub on close, error, eviction or shutdown
#[instrument(skip_all, fields(connection_id = %connection.id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection: Arc<ClientConnection>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    hub: HubHandle,
    heartbeat: HeartbeatConfig,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if hub.connect(Arc::clone(&connection)).await {
        // Outbound forwarder with periodic Ping frames.
        let outbound_conn = Arc::clone(&connection);
        let outbound_shutdown = shutdown.clone();
        let mut outbound = tokio::spawn(async move {
            let mut ping_interval = tokio::time::interval(heartbeat.interval);
            // Skip the immediate first tick
            let _ = ping_interval.tick().await;

            loop {
                tokio::select! {
                    msg = send_rx.recv() => {
                        match msg {
                            Some(text) => {
                                if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    () = outbound_conn.closed() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    () = outbound_shutdown.cancelled() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    _ = ping_interval.tick() => {
                        if !outbound_conn.check_alive()
                            && outbound_conn.last_pong_elapsed() > heartbeat.timeout
                        {
                            warn!(timeout = ?heartbeat.timeout, "client unresponsive, disconnecting");
                            counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                            let _ = ws_tx.send(Message::Close(None)).await;
                            break;
                        }
                        if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            // Wake the reader if the writer stopped first.
            outbound_conn.close();
        });

        read_frames(&mut ws_rx, &connection, &hub, &shutdown).await;

        hub.disconnect(connection.id.clone()).await;
        connection.close();
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut outbound)
            .await
            .is_err()
        {
            outbound.abort();
        }
    } else {
        warn!("hub unavailable, closing connection");
        let _ = ws_tx.send(Message::Close(None)).await;
    }

    info!(
        dropped = connection.drop_count(),
        age_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

async fn read_frames(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
    connection: &ClientConnection,
    hub: &HubHandle,
    shutdown: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = connection.closed() => break,
            () = shutdown.cancelled() => break,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                debug!(error = %err, "socket read failed");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            // Invalid UTF-8 sequences become U+FFFD before JSON decoding.
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if !hub.frame(connection.id.clone(), text).await {
            warn!("hub stopped, closing connection");
            break;
        }
    }
}
