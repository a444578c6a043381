//! Reply threading.
//!
//! A reply carries only the parent's id. Resolution happens at read time
//! against whatever the history store still retains, so a parent evicted
//! by the ring buffer degrades to a placeholder instead of an error.

use crate::history::HistoryStore;
use crate::ids::MessageId;

/// Maximum characters of parent text shown in a reply preview.
pub const PREVIEW_LENGTH: usize = 120;

/// Shown in place of a parent that is no longer retained.
pub const NOT_FOUND_PLACEHOLDER: &str = "(message not found)";

const ELLIPSIS: &str = "...";

/// Outcome of resolving a `replyTo` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPreview {
    /// The parent is still in history.
    Found {
        /// Parent message id.
        id: MessageId,
        /// Parent sender's display name.
        user: String,
        /// Truncated parent text.
        excerpt: String,
    },
    /// The parent was evicted or never existed.
    NotFound,
}

impl ReplyPreview {
    /// Text to render under the reply.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Found { excerpt, .. } => excerpt,
            Self::NotFound => NOT_FOUND_PLACEHOLDER,
        }
    }

    /// Whether the parent was found.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// Resolve a reply reference against the current history.
///
/// Returns `None` when `reply_to` is absent.
pub fn resolve_reply(history: &HistoryStore, reply_to: Option<&MessageId>) -> Option<ReplyPreview> {
    let id = reply_to?;
    Some(history.get(id).map_or(ReplyPreview::NotFound, |parent| {
        ReplyPreview::Found {
            id: parent.id.clone(),
            user: parent.user.clone(),
            excerpt: excerpt(&parent.text, PREVIEW_LENGTH),
        }
    }))
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{ELLIPSIS}", &text[..byte_idx]),
        None => text.to_owned(),
    }
}
