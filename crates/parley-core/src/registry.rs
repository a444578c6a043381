//! Session registry: connection → identity, plus the presence table.

use std::collections::HashMap;

use tracing::debug;

use crate::ids::{ConnectionId, UserId};
use crate::message::ANONYMOUS;
use crate::presence::PresenceTable;

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The connection was never registered or has already disconnected.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

/// The identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id (client-supplied or minted).
    pub user_id: UserId,
    /// Current display name.
    pub username: String,
}

/// Lifecycle state of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no identity yet.
    Connected,
    /// Identity attached via `set id` or an implicit mint.
    Identified,
}

/// Identity and state for one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The owning connection.
    pub connection_id: ConnectionId,
    /// Attached identity, if any.
    pub identity: Option<Identity>,
}

impl Session {
    fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            identity: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.identity.is_some() {
            SessionState::Identified
        } else {
            SessionState::Connected
        }
    }

    /// The user id, if identified.
    pub fn user_id(&self) -> Option<&UserId> {
        self.identity.as_ref().map(|i| &i.user_id)
    }

    /// Display name used for messages sent from this session.
    pub fn username(&self) -> &str {
        self.identity
            .as_ref()
            .map_or(ANONYMOUS, |i| i.username.as_str())
    }
}

/// Result of a rename.
#[derive(Debug, Clone)]
pub struct Renamed {
    /// The session after the rename.
    pub session: Session,
    /// Whether an identity had to be minted because none was attached.
    pub minted: bool,
}

/// Maps connections to sessions and maintains the [`PresenceTable`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    presence: PresenceTable,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, unidentified session. Returns `false` if the
    /// connection was already registered.
    pub fn connect(&mut self, connection_id: ConnectionId) -> bool {
        if self.sessions.contains_key(&connection_id) {
            return false;
        }
        let _ = self
            .sessions
            .insert(connection_id.clone(), Session::new(connection_id));
        true
    }

    /// Attach (or replace) the identity of a connection.
    ///
    /// A missing or empty `claimed_user_id` mints a fresh one. The username
    /// falls back to the presence entry for that user, then to `Anonymous`.
    pub fn identify(
        &mut self,
        connection_id: &ConnectionId,
        claimed_user_id: Option<UserId>,
        claimed_username: Option<String>,
    ) -> Result<Session, RegistryError> {
        let session = self
            .sessions
            .get_mut(connection_id)
            .ok_or_else(|| RegistryError::UnknownConnection(connection_id.clone()))?;

        let user_id = claimed_user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| {
                let minted = UserId::new();
                debug!(connection_id = %connection_id, user_id = %minted, "minted user id on identify");
                minted
            });
        let username = claimed_username
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.presence.name_of(&user_id).map(str::to_owned))
            .unwrap_or_else(|| ANONYMOUS.to_owned());

        match session.identity.take() {
            Some(previous) if previous.user_id == user_id => {
                self.presence.set_name(&user_id, username.clone());
            }
            Some(previous) => {
                let _ = self.presence.release(&previous.user_id);
                self.presence.acquire(user_id.clone(), username.clone());
            }
            None => self.presence.acquire(user_id.clone(), username.clone()),
        }

        session.identity = Some(Identity { user_id, username });
        Ok(session.clone())
    }

    /// Change a connection's display name, minting an identity if it has none.
    pub fn rename(
        &mut self,
        connection_id: &ConnectionId,
        new_username: String,
    ) -> Result<Renamed, RegistryError> {
        let session = self
            .sessions
            .get_mut(connection_id)
            .ok_or_else(|| RegistryError::UnknownConnection(connection_id.clone()))?;

        let minted = if let Some(identity) = session.identity.as_mut() {
            identity.username.clone_from(&new_username);
            self.presence.set_name(&identity.user_id, new_username);
            false
        } else {
            let user_id = UserId::new();
            debug!(connection_id = %connection_id, user_id = %user_id, "minted implicit identity on rename");
            self.presence.acquire(user_id.clone(), new_username.clone());
            session.identity = Some(Identity {
                user_id,
                username: new_username,
            });
            true
        };

        Ok(Renamed {
            session: session.clone(),
            minted,
        })
    }

    /// Detach a connection. Drops its presence entry once no other session
    /// holds the same user id.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(connection_id)?;
        if let Some(user_id) = session.user_id() {
            let _ = self.presence.release(user_id);
        }
        Some(session)
    }

    /// Look up a live session.
    pub fn session(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    /// Snapshot of present display names.
    pub fn list_usernames(&self) -> Vec<String> {
        self.presence.usernames()
    }

    /// Read-only view of the presence table.
    pub fn presence(&self) -> &PresenceTable {
        &self.presence
    }

    /// Number of live sessions, identified or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of distinct present users.
    pub fn presence_len(&self) -> usize {
        self.presence.len()
    }
}
