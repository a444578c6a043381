//! Wire protocol: JSON envelopes `{"type": ..., "data": ...}`.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::message::ChatMessage;
use crate::validation::ValidationError;

/// Wire code for frames that cannot be decoded.
pub const MALFORMED_EVENT: &str = "MALFORMED_EVENT";

/// Payload of `set_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetIdPayload {
    /// Claimed user id. Absent or empty mints a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Claimed display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Payload of `set_username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUsernamePayload {
    /// New display name.
    pub username: String,
}

/// Payload of an inbound `chat_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    /// Message body.
    pub text: String,
    /// Parent message id. Empty is treated as absent.
    #[serde(default)]
    pub reply_to: Option<String>,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Declare identity.
    SetId(SetIdPayload),
    /// Change display name.
    SetUsername(SetUsernamePayload),
    /// Post a message.
    ChatMessage(ChatMessagePayload),
}

impl ClientEvent {
    /// Short name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetId(_) => "set_id",
            Self::SetUsername(_) => "set_username",
            Self::ChatMessage(_) => "chat_message",
        }
    }
}

/// Effective identity echoed back after `set_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedPayload {
    /// Effective user id (client-supplied or minted).
    pub user_id: UserId,
    /// Effective display name.
    pub username: String,
}

/// Targeted error notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl From<&ValidationError> for ErrorNotice {
    fn from(err: &ValidationError) -> Self {
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

impl From<&ProtocolError> for ErrorNotice {
    fn from(err: &ProtocolError) -> Self {
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Identity confirmation (sender only).
    Identified(IdentifiedPayload),
    /// Full history snapshot (sender only).
    ChatHistory(Vec<ChatMessage>),
    /// A new message (everyone).
    ChatMessage(ChatMessage),
    /// Present display names (everyone).
    UserList(Vec<String>),
    /// Join/leave notice (everyone).
    ServerMessage(String),
    /// Rejection of the sender's last event.
    Error(ErrorNotice),
}

impl ServerEvent {
    /// Short name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identified(_) => "identified",
            Self::ChatHistory(_) => "chat_history",
            Self::ChatMessage(_) => "chat_message",
            Self::UserList(_) => "user_list",
            Self::ServerMessage(_) => "server_message",
            Self::Error(_) => "error",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode failures for inbound frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Bad JSON, unknown `type`, or wrongly typed fields.
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => MALFORMED_EVENT,
        }
    }
}

/// Decode a client text frame.
pub fn decode_client_event(raw: &str) -> Result<ClientEvent, ProtocolError> {
    serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
