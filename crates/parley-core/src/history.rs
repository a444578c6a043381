//! Bounded FIFO store of past chat messages.

use std::collections::VecDeque;

use crate::ids::MessageId;
use crate::message::ChatMessage;

/// Default number of messages retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Insertion-ordered ring buffer of messages, capped at `capacity`.
///
/// Write-once: messages are appended and eventually evicted from the head,
/// never updated or deleted individually.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl HistoryStore {
    /// Create an empty store. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the tail, evicting from the head until `len == capacity`.
    ///
    /// Returns the evicted messages (oldest first), usually none or one.
    pub fn append(&mut self, message: ChatMessage) -> Vec<ChatMessage> {
        self.messages.push_back(message);
        let mut evicted = Vec::new();
        while self.messages.len() > self.capacity {
            if let Some(old) = self.messages.pop_front() {
                evicted.push(old);
            }
        }
        debug_assert!(self.messages.len() <= self.capacity);
        evicted
    }

    /// Owned copy of the current contents in arrival order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Look up a retained message by id.
    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of retained messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
