//! The broadcast hub state machine.
//!
//! [`ChatHub`] owns the session registry and the history store. It never
//! touches a socket: every operation returns the [`Outbound`] events the
//! transport must deliver, in order.

use tracing::{debug, info, warn};

use crate::history::HistoryStore;
use crate::ids::{ConnectionId, MessageId, UserId};
use crate::message::{ANONYMOUS, ChatMessage, local_time};
use crate::protocol::{
    ChatMessagePayload, ClientEvent, ErrorNotice, IdentifiedPayload, ServerEvent, SetIdPayload,
    SetUsernamePayload, decode_client_event,
};
use crate::registry::{Session, SessionRegistry};
use crate::threading::{ReplyPreview, resolve_reply};
use crate::validation::{
    ChatLimits, ValidationError, validate_optional_username, validate_text, validate_user_id,
    validate_username,
};

/// Who receives an outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// One connection.
    Connection(ConnectionId),
    /// Every live connection.
    All,
}

/// An event to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Target.
    pub recipient: Recipient,
    /// Payload.
    pub event: ServerEvent,
}

impl Outbound {
    /// Deliver to one connection.
    pub fn to(connection_id: &ConnectionId, event: ServerEvent) -> Self {
        Self {
            recipient: Recipient::Connection(connection_id.clone()),
            event,
        }
    }

    /// Deliver to everyone.
    pub fn all(event: ServerEvent) -> Self {
        Self {
            recipient: Recipient::All,
            event,
        }
    }
}

/// Produces the `HH:MM` stamp for new messages.
pub type Clock = fn() -> String;

/// Chat state plus the per-connection protocol.
#[derive(Debug)]
pub struct ChatHub {
    registry: SessionRegistry,
    history: HistoryStore,
    limits: ChatLimits,
    clock: Clock,
    orphaned_replies: u64,
}

impl ChatHub {
    /// Create a hub with the given history capacity and input limits.
    pub fn new(history_capacity: usize, limits: ChatLimits) -> Self {
        Self {
            registry: SessionRegistry::new(),
            history: HistoryStore::new(history_capacity),
            limits,
            clock: local_time,
            orphaned_replies: 0,
        }
    }

    /// Replace the message clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Open a session for a new connection. Emits nothing.
    pub fn connect(&mut self, connection_id: ConnectionId) -> Vec<Outbound> {
        if self.registry.connect(connection_id.clone()) {
            debug!(connection_id = %connection_id, "session opened");
        } else {
            warn!(connection_id = %connection_id, "duplicate connect ignored");
        }
        Vec::new()
    }

    /// Decode and handle a raw text frame.
    ///
    /// Undecodable frames are answered with a `MALFORMED_EVENT` error to the
    /// sender only.
    pub fn handle_frame(&mut self, connection_id: &ConnectionId, raw: &str) -> Vec<Outbound> {
        if self.registry.session(connection_id).is_none() {
            warn!(connection_id = %connection_id, "frame from unknown connection dropped");
            return Vec::new();
        }
        match decode_client_event(raw) {
            Ok(event) => self.handle(connection_id, event),
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "malformed frame");
                vec![Outbound::to(
                    connection_id,
                    ServerEvent::Error(ErrorNotice::from(&err)),
                )]
            }
        }
    }

    /// Handle a decoded client event.
    pub fn handle(&mut self, connection_id: &ConnectionId, event: ClientEvent) -> Vec<Outbound> {
        if self.registry.session(connection_id).is_none() {
            warn!(
                connection_id = %connection_id,
                event = event.name(),
                "event from unknown connection dropped"
            );
            return Vec::new();
        }
        let result = match event {
            ClientEvent::SetId(payload) => self.set_id(connection_id, payload),
            ClientEvent::SetUsername(payload) => self.set_username(connection_id, payload),
            ClientEvent::ChatMessage(payload) => self.chat_message(connection_id, payload),
        };
        result.unwrap_or_else(|err| {
            debug!(connection_id = %connection_id, code = err.code(), "event rejected");
            vec![Outbound::to(
                connection_id,
                ServerEvent::Error(ErrorNotice::from(&err)),
            )]
        })
    }

    /// Close a session. Identified sessions produce a fresh user list and a
    /// leave notice.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Vec<Outbound> {
        let Some(session) = self.registry.session(connection_id) else {
            debug!(connection_id = %connection_id, "disconnect for unknown connection");
            return Vec::new();
        };
        let departing = session.identity.as_ref().map(|identity| {
            self.registry
                .presence()
                .name_of(&identity.user_id)
                .unwrap_or(identity.username.as_str())
                .to_owned()
        });

        let _ = self.registry.remove(connection_id);
        let Some(name) = departing else {
            debug!(connection_id = %connection_id, "unidentified session closed");
            return Vec::new();
        };

        info!(connection_id = %connection_id, username = %name, "user left");
        vec![
            Outbound::all(ServerEvent::UserList(self.registry.list_usernames())),
            Outbound::all(ServerEvent::ServerMessage(format!("{name} left the chat"))),
        ]
    }

    fn set_id(
        &mut self,
        connection_id: &ConnectionId,
        payload: SetIdPayload,
    ) -> Result<Vec<Outbound>, ValidationError> {
        validate_user_id(payload.id.as_deref(), &self.limits)?;
        validate_optional_username(payload.username.as_deref(), &self.limits)?;

        let session = match self.registry.identify(
            connection_id,
            payload.id.map(UserId::from),
            payload.username,
        ) {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "identify failed");
                return Ok(Vec::new());
            }
        };
        let (user_id, username) = identity_of(&session);
        info!(connection_id = %connection_id, user_id = %user_id, username = %username, "user identified");

        Ok(vec![
            Outbound::to(
                connection_id,
                ServerEvent::Identified(IdentifiedPayload {
                    user_id,
                    username: username.clone(),
                }),
            ),
            Outbound::to(connection_id, ServerEvent::ChatHistory(self.history.snapshot())),
            Outbound::all(ServerEvent::UserList(self.registry.list_usernames())),
            Outbound::all(ServerEvent::ServerMessage(format!("{username} joined the chat"))),
        ])
    }

    fn set_username(
        &mut self,
        connection_id: &ConnectionId,
        payload: SetUsernamePayload,
    ) -> Result<Vec<Outbound>, ValidationError> {
        validate_username(&payload.username, &self.limits)?;
        match self.registry.rename(connection_id, payload.username) {
            Ok(renamed) => {
                debug!(
                    connection_id = %connection_id,
                    minted = renamed.minted,
                    username = renamed.session.username(),
                    "username set"
                );
            }
            Err(err) => {
                warn!(error = %err, "rename failed");
                return Ok(Vec::new());
            }
        }
        Ok(vec![Outbound::all(ServerEvent::UserList(
            self.registry.list_usernames(),
        ))])
    }

    fn chat_message(
        &mut self,
        connection_id: &ConnectionId,
        payload: ChatMessagePayload,
    ) -> Result<Vec<Outbound>, ValidationError> {
        validate_text(&payload.text, &self.limits)?;
        let user = self
            .registry
            .session(connection_id)
            .map_or_else(|| ANONYMOUS.to_owned(), |s| s.username().to_owned());
        let reply_to = payload
            .reply_to
            .filter(|id| !id.is_empty())
            .map(MessageId::from);

        if let Some(ReplyPreview::NotFound) = resolve_reply(&self.history, reply_to.as_ref()) {
            self.orphaned_replies += 1;
            debug!(
                connection_id = %connection_id,
                reply_to = ?reply_to,
                "reply references a message no longer in history"
            );
        }

        let message = ChatMessage::new(user, payload.text, (self.clock)(), reply_to);
        let evicted = self.history.append(message.clone());
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "history evicted oldest messages");
        }
        Ok(vec![Outbound::all(ServerEvent::ChatMessage(message))])
    }

    /// Read-only view of the history store.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Read-only view of the session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Replies accepted whose parent was no longer in history.
    pub fn orphaned_replies(&self) -> u64 {
        self.orphaned_replies
    }

    /// Input limits in force.
    pub fn limits(&self) -> &ChatLimits {
        &self.limits
    }
}

fn identity_of(session: &Session) -> (UserId, String) {
    match &session.identity {
        Some(identity) => (identity.user_id.clone(), identity.username.clone()),
        None => (UserId::from(""), session.username().to_owned()),
    }
}
