//! History and input limit settings.

use serde::{Deserialize, Serialize};

/// Chat behaviour settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Messages retained and replayed to newly identified clients. Must be at least 1.
    pub history_capacity: usize,
    /// Maximum characters per chat message.
    pub max_text_length: usize,
    /// Maximum characters per display name.
    pub max_username_length: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_capacity: 200,
            max_text_length: 2_000,
            max_username_length: 64,
        }
    }
}
