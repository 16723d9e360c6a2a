use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as loaded from the platform for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub message: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    /// Empty for thread roots.
    pub root_id: String,
    /// Platform message kind; empty for plain user messages.
    pub kind: String,
    pub from_bot: bool,
    pub is_system_message: bool,
    /// Removed on the platform; kept only as thread context.
    #[serde(default)]
    pub is_deleted: bool,
}

impl Post {
    pub fn is_root(&self) -> bool {
        self.root_id.is_empty()
    }

    pub fn is_reply(&self) -> bool {
        !self.is_root()
    }
}

/// True when `message` notifies `username` through an explicit or channel-wide mention.
pub fn message_mentions(message: &str, username: &str) -> bool {
    message.contains("@all")
        || message.contains("@channel")
        || (!username.is_empty() && message.contains(&format!("@{}", username)))
}
