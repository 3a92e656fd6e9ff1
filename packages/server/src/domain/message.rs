//! Shapes exchanged with the storage collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::{ChannelId, MessageId, UserId};

/// Insert request for a channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannelMessage {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

/// Insert request for a 1:1 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDirectMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A stored channel message joined with its sender's display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub content: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<MessageId>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub pfp_path: String,
}

/// Display fields of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDisplay {
    pub username: String,
    pub pfp_path: String,
}

impl UserDisplay {
    /// Placeholder used when the lookup fails.
    pub fn unknown() -> Self {
        Self {
            username: "Unknown".to_string(),
            pfp_path: String::new(),
        }
    }
}
