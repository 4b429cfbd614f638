// emberbot-core/src/models/command.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted command name.
pub const MAX_COMMAND_NAME_LEN: usize = 25;

/// Longest accepted command content; matches the chat message-length limit.
pub const MAX_COMMAND_CONTENT_LEN: usize = 500;

/// A moderator-editable chat command.
///
/// `command_name` is the lookup key and is always stored lowercased;
/// `content` keeps whatever casing it was written with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCommand {
    pub command_id: Uuid,
    pub command_name: String,
    pub content: String,
    pub is_mod_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomCommand {
    pub fn new(name: &str, content: &str, is_mod_only: bool) -> Self {
        let now = Utc::now();
        Self {
            command_id: Uuid::new_v4(),
            command_name: name.trim().to_lowercase(),
            content: content.to_string(),
            is_mod_only,
            created_at: now,
            updated_at: now,
        }
    }
}
