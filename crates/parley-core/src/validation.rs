//! Input validation for inbound client events.
//!
//! Lengths are measured in characters, not bytes.

/// Default maximum chat message length.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 2_000;

/// Default maximum display name length.
pub const DEFAULT_MAX_USERNAME_LENGTH: usize = 64;

/// Maximum client-supplied user id length.
pub const MAX_USER_ID_LENGTH: usize = 128;

/// A rejected inbound payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message text is empty or only whitespace.
    #[error("message text is empty")]
    EmptyText,
    /// Message text exceeds the configured limit.
    #[error("message text is too long ({len} > {max} characters)")]
    TextTooLong {
        /// Actual length.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// A required username is empty or only whitespace.
    #[error("username is empty")]
    EmptyUsername,
    /// Username exceeds the configured limit.
    #[error("username is too long ({len} > {max} characters)")]
    UsernameTooLong {
        /// Actual length.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// Client-supplied user id exceeds the limit.
    #[error("user id is too long ({len} > {max} characters)")]
    UserIdTooLong {
        /// Actual length.
        len: usize,
        /// Limit.
        max: usize,
    },
}

impl ValidationError {
    /// Stable wire code sent in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyText => "EMPTY_TEXT",
            Self::TextTooLong { .. } => "TEXT_TOO_LONG",
            Self::EmptyUsername => "EMPTY_USERNAME",
            Self::UsernameTooLong { .. } => "USERNAME_TOO_LONG",
            Self::UserIdTooLong { .. } => "USER_ID_TOO_LONG",
        }
    }
}

/// Size limits applied to inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLimits {
    /// Maximum chat message length.
    pub max_text_length: usize,
    /// Maximum display name length.
    pub max_username_length: usize,
    /// Maximum user id length.
    pub max_user_id_length: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            max_username_length: DEFAULT_MAX_USERNAME_LENGTH,
            max_user_id_length: MAX_USER_ID_LENGTH,
        }
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Validate chat message text.
pub fn validate_text(text: &str, limits: &ChatLimits) -> Result<(), ValidationError> {
    if is_blank(text) {
        return Err(ValidationError::EmptyText);
    }
    let len = text.chars().count();
    if len > limits.max_text_length {
        return Err(ValidationError::TextTooLong {
            len,
            max: limits.max_text_length,
        });
    }
    Ok(())
}

/// Validate a username that must be present (`set username`).
pub fn validate_username(username: &str, limits: &ChatLimits) -> Result<(), ValidationError> {
    if is_blank(username) {
        return Err(ValidationError::EmptyUsername);
    }
    check_username_length(username, limits)
}

/// Validate an optional username (`set id`). Absent or blank is accepted
/// and resolved by the registry's fallback chain.
pub fn validate_optional_username(
    username: Option<&str>,
    limits: &ChatLimits,
) -> Result<(), ValidationError> {
    match username {
        Some(name) if !is_blank(name) => check_username_length(name, limits),
        _ => Ok(()),
    }
}

/// Validate an optional client-supplied user id.
pub fn validate_user_id(user_id: Option<&str>, limits: &ChatLimits) -> Result<(), ValidationError> {
    let Some(id) = user_id else {
        return Ok(());
    };
    let len = id.chars().count();
    if len > limits.max_user_id_length {
        return Err(ValidationError::UserIdTooLong {
            len,
            max: limits.max_user_id_length,
        });
    }
    Ok(())
}

fn check_username_length(username: &str, limits: &ChatLimits) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if len > limits.max_username_length {
        return Err(ValidationError::UsernameTooLong {
            len,
            max: limits.max_username_length,
        });
    }
    Ok(())
}
