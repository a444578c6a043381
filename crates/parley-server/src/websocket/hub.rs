//! Hub actor: the single task that owns chat state.
//!
//! Sessions never touch [`ChatHub`] directly. They send [`HubCommand`]s on
//! one channel and the actor applies them in arrival order, serializes each
//! resulting event once, and enqueues it on the target connections.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use parley_core::{ChatHub, ConnectionId, Outbound, Recipient, ServerEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{ClientConnection, SendError};
use crate::metrics::{
    CHAT_EVENTS_TOTAL, CHAT_FRAMES_TOTAL, CHAT_HISTORY_SIZE, CHAT_ORPHANED_REPLIES_TOTAL,
    CHAT_PRESENT_USERS, CHAT_REJECTIONS_TOTAL, HUB_COMMAND_DURATION_SECONDS,
    WS_QUEUE_FULL_CLOSES_TOTAL,
};

/// Depth of the shared inbound command queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Point-in-time counters from the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Connections with a live outbound queue.
    pub connections: usize,
    /// Sessions known to the registry.
    pub sessions: usize,
    /// Distinct present users.
    pub present_users: usize,
    /// Messages in history.
    pub history_len: usize,
}

/// Work items for the actor.
pub enum HubCommand {
    /// A socket finished its upgrade.
    Connect(Arc<ClientConnection>),
    /// A text (or UTF-8 binary) frame arrived.
    Frame {
        /// Sender.
        connection_id: ConnectionId,
        /// Raw frame body.
        text: String,
    },
    /// A socket closed.
    Disconnect(ConnectionId),
    /// Report counters.
    Stats(oneshot::Sender<HubStats>),
}

/// Cloneable sender side of the actor.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a connection. Returns `false` if the actor has stopped.
    pub async fn connect(&self, connection: Arc<ClientConnection>) -> bool {
        self.tx.send(HubCommand::Connect(connection)).await.is_ok()
    }

    /// Forward an inbound frame. Returns `false` if the actor has stopped.
    pub async fn frame(&self, connection_id: ConnectionId, text: String) -> bool {
        self.tx
            .send(HubCommand::Frame {
                connection_id,
                text,
            })
            .await
            .is_ok()
    }

    /// Report a closed socket.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        if self
            .tx
            .send(HubCommand::Disconnect(connection_id))
            .await
            .is_err()
        {
            debug!("hub stopped before disconnect was delivered");
        }
    }

    /// Fetch counters. `None` once the actor has stopped.
    pub async fn stats(&self) -> Option<HubStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(HubCommand::Stats(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }
}

/// Start the actor. It runs until `cancel` fires or every handle is dropped.
pub fn spawn_hub(hub: ChatHub, cancel: CancellationToken) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let actor = HubActor {
        hub,
        connections: HashMap::new(),
    };
    let handle = tokio::spawn(actor.run(rx, cancel));
    (HubHandle { tx }, handle)
}

struct HubActor {
    hub: ChatHub,
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
}

impl HubActor {
    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>, cancel: CancellationToken) {
        info!(
            history_capacity = self.hub.history().capacity(),
            "hub started"
        );
        loop {
            let command = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            let started = Instant::now();
            self.process(command);
            histogram!(HUB_COMMAND_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }

        for connection in self.connections.values() {
            connection.close();
        }
        info!(connections = self.connections.len(), "hub stopped");
    }

    fn process(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect(connection) => {
                let id = connection.id.clone();
                let _ = self.connections.insert(id.clone(), connection);
                let outbound = self.hub.connect(id);
                self.deliver(outbound);
            }
            HubCommand::Frame {
                connection_id,
                text,
            } => {
                counter!(CHAT_FRAMES_TOTAL).increment(1);
                let orphaned_before = self.hub.orphaned_replies();
                let outbound = self.hub.handle_frame(&connection_id, &text);
                let orphaned = self.hub.orphaned_replies() - orphaned_before;
                if orphaned > 0 {
                    counter!(CHAT_ORPHANED_REPLIES_TOTAL).increment(orphaned);
                }
                self.deliver(outbound);
            }
            HubCommand::Disconnect(connection_id) => {
                let _ = self.connections.remove(&connection_id);
                let outbound = self.hub.disconnect(&connection_id);
                self.deliver(outbound);
            }
            HubCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
        record_gauges(&self.hub);
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            sessions: self.hub.registry().session_count(),
            present_users: self.hub.registry().presence_len(),
            history_len: self.hub.history().len(),
        }
    }

    /// Enqueue events in order. Connections that cannot accept an event are
    /// closed and their disconnect events are appended to the same queue.
    fn deliver(&mut self, outbound: Vec<Outbound>) {
        let mut queue: VecDeque<Outbound> = outbound.into();
        while let Some(Outbound { recipient, event }) = queue.pop_front() {
            counter!(CHAT_EVENTS_TOTAL, "event" => event.name()).increment(1);
            if let ServerEvent::Error(notice) = &event {
                counter!(CHAT_REJECTIONS_TOTAL, "code" => notice.code.clone()).increment(1);
            }

            let payload = match event.to_json() {
                Ok(json) => Arc::new(json),
                Err(err) => {
                    error!(event = event.name(), error = %err, "failed to serialize event");
                    continue;
                }
            };

            let mut failed = Vec::new();
            match recipient {
                Recipient::Connection(id) => match self.connections.get(&id) {
                    Some(connection) => {
                        if let Err(reason) = connection.send(payload) {
                            failed.push((id, reason));
                        }
                    }
                    None => debug!(connection_id = %id, "target connection already gone"),
                },
                Recipient::All => {
                    for (id, connection) in &self.connections {
                        if let Err(reason) = connection.send(Arc::clone(&payload)) {
                            failed.push((id.clone(), reason));
                        }
                    }
                }
            }

            for (id, reason) in failed {
                queue.extend(self.evict(&id, reason));
            }
        }
    }

    fn evict(&mut self, id: &ConnectionId, reason: SendError) -> Vec<Outbound> {
        let Some(connection) = self.connections.remove(id) else {
            return Vec::new();
        };
        match reason {
            SendError::Full => {
                warn!(
                    connection_id = %id,
                    dropped = connection.drop_count(),
                    "outbound queue full, closing connection"
                );
                counter!(WS_QUEUE_FULL_CLOSES_TOTAL).increment(1);
            }
            SendError::Closed => debug!(connection_id = %id, "writer gone, dropping connection"),
        }
        connection.close();
        self.hub.disconnect(id)
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_gauges(hub: &ChatHub) {
    gauge!(CHAT_HISTORY_SIZE).set(hub.history().len() as f64);
    gauge!(CHAT_PRESENT_USERS).set(hub.registry().presence_len() as f64);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_core::ChatLimits;
    use serde_json::{Value, json};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn fixed_clock() -> String {
        "08:00".into()
    }

    fn start(capacity: usize) -> (HubHandle, JoinHandle<()>, CancellationToken) {
        let cancel = CancellationToken::new();
        let hub = ChatHub::new(capacity, ChatLimits::default()).with_clock(fixed_clock);
        let (handle, task) = spawn_hub(hub, cancel.clone());
        (handle, task, cancel)
    }

    async fn join(
        hub: &HubHandle,
        id: &str,
        queue: usize,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(queue);
        let connection = Arc::new(ClientConnection::new(ConnectionId::from(id), tx));
        assert!(hub.connect(Arc::clone(&connection)).await);
        (connection, rx)
    }

    async fn next(rx: &mut mpsc::Receiver<Arc<String>>) -> Value {
        let raw = tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");
        serde_json::from_str(&raw).unwrap()
    }

    async fn send(hub: &HubHandle, id: &str, value: Value) {
        assert!(hub.frame(ConnectionId::from(id), value.to_string()).await);
    }

    #[tokio::test]
    async fn identify_fans_out_in_order() {
        let (hub, _task, _cancel) = start(200);
        let (_a, mut a_rx) = join(&hub, "a", 16).await;
        let (_b, mut b_rx) = join(&hub, "b", 16).await;

        send(&hub, "a", json!({"type": "set_id", "data": {"id": "u1", "username": "Alice"}})).await;

        assert_eq!(next(&mut a_rx).await["type"], "identified");
        assert_eq!(next(&mut a_rx).await, json!({"type": "chat_history", "data": []}));
        assert_eq!(next(&mut a_rx).await, json!({"type": "user_list", "data": ["Alice"]}));
        assert_eq!(
            next(&mut a_rx).await,
            json!({"type": "server_message", "data": "Alice joined the chat"})
        );

        assert_eq!(next(&mut b_rx).await, json!({"type": "user_list", "data": ["Alice"]}));
        assert_eq!(
            next(&mut b_rx).await,
            json!({"type": "server_message", "data": "Alice joined the chat"})
        );
    }

    #[tokio::test]
    async fn chat_message_reaches_everyone_and_errors_only_sender() {
        let (hub, _task, _cancel) = start(200);
        let (_a, mut a_rx) = join(&hub, "a", 16).await;
        let (_b, mut b_rx) = join(&hub, "b", 16).await;

        send(&hub, "a", json!({"type": "chat_message", "data": {"text": ""}})).await;
        send(&hub, "a", json!({"type": "chat_message", "data": {"text": "hello"}})).await;

        let err = next(&mut a_rx).await;
        assert_eq!(err["type"], "error");
        assert_eq!(err["data"]["code"], "EMPTY_TEXT");
        assert_eq!(next(&mut a_rx).await["data"]["text"], "hello");

        let first_for_b = next(&mut b_rx).await;
        assert_eq!(first_for_b["type"], "chat_message");
        assert_eq!(first_for_b["data"]["user"], "Anonymous");
        assert_eq!(first_for_b["data"]["time"], "08:00");
    }

    #[tokio::test]
    async fn malformed_frame_is_answered() {
        let (hub, _task, _cancel) = start(200);
        let (_a, mut a_rx) = join(&hub, "a", 16).await;
        assert!(hub.frame(ConnectionId::from("a"), "{{{".into()).await);
        assert_eq!(next(&mut a_rx).await["data"]["code"], "MALFORMED_EVENT");
    }

    #[tokio::test]
    async fn disconnect_announces_departure() {
        let (hub, _task, _cancel) = start(200);
        let (_a, mut a_rx) = join(&hub, "a", 16).await;
        let (_b, mut b_rx) = join(&hub, "b", 16).await;
        send(&hub, "a", json!({"type": "set_id", "data": {"id": "u1", "username": "Alice"}})).await;
        for _ in 0..4 {
            let _ = next(&mut a_rx).await;
        }
        for _ in 0..2 {
            let _ = next(&mut b_rx).await;
        }

        hub.disconnect(ConnectionId::from("a")).await;
        assert_eq!(next(&mut b_rx).await, json!({"type": "user_list", "data": []}));
        assert_eq!(
            next(&mut b_rx).await,
            json!({"type": "server_message", "data": "Alice left the chat"})
        );

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.present_users, 0);
    }

    #[tokio::test]
    async fn full_queue_closes_slow_connection() {
        let (hub, _task, _cancel) = start(200);
        let (_a, _a_rx) = join(&hub, "a", 16).await;
        let (slow, _slow_rx) = join(&hub, "slow", 1).await;

        send(&hub, "a", json!({"type": "chat_message", "data": {"text": "one"}})).await;
        send(&hub, "a", json!({"type": "chat_message", "data": {"text": "two"}})).await;

        let stats = hub.stats().await.unwrap();
        assert!(slow.is_closing());
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.history_len, 2);
    }

    #[tokio::test]
    async fn evicted_identified_user_is_announced_as_leaving() {
        let (hub, _task, _cancel) = start(200);
        let (_a, mut a_rx) = join(&hub, "a", 64).await;
        let (_slow, _slow_rx) = join(&hub, "slow", 4).await;
        send(&hub, "slow", json!({"type": "set_id", "data": {"id": "u2", "username": "Sloth"}})).await;
        for _ in 0..2 {
            let _ = next(&mut a_rx).await;
        }

        send(&hub, "a", json!({"type": "chat_message", "data": {"text": "overflow"}})).await;
        assert_eq!(next(&mut a_rx).await["type"], "chat_message");
        assert_eq!(next(&mut a_rx).await, json!({"type": "user_list", "data": []}));
        assert_eq!(
            next(&mut a_rx).await,
            json!({"type": "server_message", "data": "Sloth left the chat"})
        );
    }

    #[tokio::test]
    async fn history_snapshot_is_bounded() {
        let (hub, _task, _cancel) = start(3);
        let (_a, _a_rx) = join(&hub, "a", 64).await;
        for i in 0..10 {
            send(&hub, "a", json!({"type": "chat_message", "data": {"text": format!("m{i}")}})).await;
        }
        assert_eq!(hub.stats().await.unwrap().history_len, 3);

        let (_b, mut b_rx) = join(&hub, "b", 64).await;
        send(&hub, "b", json!({"type": "set_id", "data": {}})).await;
        let _ = next(&mut b_rx).await;
        let history = next(&mut b_rx).await;
        let texts: Vec<&str> = history["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, ["m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn cancel_stops_actor_and_closes_connections() {
        let (hub, task, cancel) = start(200);
        let (a, _a_rx) = join(&hub, "a", 16).await;
        let _ = hub.stats().await.unwrap();

        cancel.cancel();
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert!(a.is_closing());
        assert!(hub.stats().await.is_none());
        assert!(!hub.frame(ConnectionId::from("a"), "{}".into()).await);
    }
}
