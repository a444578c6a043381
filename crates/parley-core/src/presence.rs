//! Presence table: `userId → username` for connected, identified users.

use std::collections::BTreeMap;

use crate::ids::UserId;

#[derive(Debug, Clone)]
struct PresenceEntry {
    username: String,
    /// Live identified sessions holding this user id.
    holders: usize,
}

/// Mapping from user id to current display name.
///
/// Keys are exactly the user ids held by at least one identified session.
/// Mutation is crate-private; callers go through
/// [`SessionRegistry`](crate::registry::SessionRegistry).
#[derive(Debug, Clone, Default)]
pub struct PresenceTable {
    entries: BTreeMap<UserId, PresenceEntry>,
}

impl PresenceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current display name for a user, if present.
    pub fn name_of(&self, user_id: &UserId) -> Option<&str> {
        self.entries.get(user_id).map(|e| e.username.as_str())
    }

    /// Whether the user currently has an entry.
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.entries.contains_key(user_id)
    }

    /// Snapshot of display names, ordered by user id.
    pub fn usernames(&self) -> Vec<String> {
        self.entries.values().map(|e| e.username.clone()).collect()
    }

    /// Number of distinct present users.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register one more session for `user_id` and set its name (last writer wins).
    pub(crate) fn acquire(&mut self, user_id: UserId, username: String) {
        let entry = self.entries.entry(user_id).or_insert(PresenceEntry {
            username: String::new(),
            holders: 0,
        });
        entry.username = username;
        entry.holders += 1;
    }

    /// Overwrite the display name without changing the holder count.
    pub(crate) fn set_name(&mut self, user_id: &UserId, username: String) {
        if let Some(entry) = self.entries.get_mut(user_id) {
            entry.username = username;
        }
    }

    /// Release one session's hold on `user_id`.
    ///
    /// Returns the display name if this was the last holder and the entry
    /// was removed.
    pub(crate) fn release(&mut self, user_id: &UserId) -> Option<String> {
        let entry = self.entries.get_mut(user_id)?;
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders == 0 {
            self.entries.remove(user_id).map(|e| e.username)
        } else {
            None
        }
    }
}
