//! Chat message model.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Display name used when a sender has not identified.
pub const ANONYMOUS: &str = "Anonymous";

/// `strftime` pattern for [`ChatMessage::time`] (two-digit hour and minute).
pub const TIME_FORMAT: &str = "%H:%M";

/// A single chat message. Immutable once created.
///
/// `reply_to` is a weak reference to an earlier message id. It is never
/// checked against the history store and may point at an evicted message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Fresh, unique id assigned by the server.
    pub id: MessageId,
    /// Sender's display name at the time of sending.
    pub user: String,
    /// Message body.
    pub text: String,
    /// Server-local wall clock time, formatted with [`TIME_FORMAT`].
    pub time: String,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<MessageId>,
}

impl ChatMessage {
    /// Build a message with a freshly minted id.
    pub fn new(
        user: impl Into<String>,
        text: impl Into<String>,
        time: impl Into<String>,
        reply_to: Option<MessageId>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            user: user.into(),
            text: text.into(),
            time: time.into(),
            reply_to,
        }
    }

    /// Whether this message is part of a reply thread.
    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}

/// Format a timestamp the way messages carry it.
pub fn format_time<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIME_FORMAT).to_string()
}

/// Current server-local time, formatted for a message.
pub fn local_time() -> String {
    format_time(&Local::now())
}
