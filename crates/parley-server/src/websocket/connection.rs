//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Why an enqueue failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The outbound queue is at capacity.
    Full,
    /// The writer task has gone away.
    Closed,
}

/// A connected WebSocket client as seen by the hub.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Cancelled when the hub or heartbeat wants the socket closed.
    close: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    is_alive: AtomicBool,
    /// When the last pong (or any inbound frame) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages that could not be enqueued.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            close: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a serialized event without waiting.
    pub fn send(&self, message: Arc<String>) -> Result<(), SendError> {
        self.tx.try_send(message).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            }
        })
    }

    /// Total messages that could not be enqueued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Ask the session task to close the socket.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether a close was requested.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once a close was requested.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }

    /// Mark the connection as alive (pong or frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Bounded pool of connection slots.
pub struct ConnectionSlots {
    active: AtomicUsize,
    max: usize,
}

impl ConnectionSlots {
    /// Allow at most `max` concurrent holders.
    pub fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Take a slot, or `None` when all are in use.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard(Arc::clone(self)))
    }

    /// Slots currently held.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Releases its slot on drop.
pub struct SlotGuard(Arc<ConnectionSlots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(ConnectionId::from("conn_1"), tx);
        (conn, rx)
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.send(Arc::new("hello".into())).is_ok());
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn send_to_full_channel_reports_full() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("msg1".into())).is_ok());
        assert_eq!(conn.send(Arc::new("msg2".into())), Err(SendError::Full));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_to_closed_channel_reports_closed() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert_eq!(conn.send(Arc::new("hello".into())), Err(SendError::Closed));
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn last_pong_elapsed_is_fresh() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.last_pong_elapsed() < Duration::from_secs(1));
        assert!(conn.age() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn close_resolves_closed_future() {
        let (conn, _rx) = make_connection(8);
        let conn = Arc::new(conn);
        assert!(!conn.is_closing());
        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.closed().await })
        };
        conn.close();
        waiter.await.unwrap();
        assert!(conn.is_closing());
    }

    #[test]
    fn slots_are_bounded_and_released_on_drop() {
        let slots = Arc::new(ConnectionSlots::new(2));
        let first = slots.try_acquire().unwrap();
        let _second = slots.try_acquire().unwrap();
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.active(), 2);

        drop(first);
        assert_eq!(slots.active(), 1);
        assert!(slots.try_acquire().is_some());
    }

    #[test]
    fn rejected_acquire_leaves_count_unchanged() {
        let slots = Arc::new(ConnectionSlots::new(1));
        let held = slots.try_acquire();
        assert!(held.is_some());
        for _ in 0..3 {
            assert!(slots.try_acquire().is_none());
        }
        assert_eq!(slots.active(), 1);
        drop(held);
        assert_eq!(slots.active(), 0);
    }

    #[test]
    fn zero_capacity_never_grants() {
        let slots = Arc::new(ConnectionSlots::new(0));
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.active(), 0);
    }
}
