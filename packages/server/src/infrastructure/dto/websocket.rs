//! WebSocket wire envelope and codec.
//!
//! Every frame in both directions is one JSON object:
//!
//! ```text
//! {type, channel_id, chat_room, sender_id, receiver_id, user_id, username,
//!  content, message_id, created_at, pfp_path, data, timestamp}
//! ```
//!
//! `channel_id` is the only loosely typed field. It is normalized here, once,
//! into a [`ChannelId`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ChannelId, UserId};

/// Message kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // channel
    JoinChannel,
    LeaveChannel,
    SendChannelMessage,
    GetChannelMessages,
    #[serde(rename = "messages_history")]
    ChannelHistory,
    NewMessage,
    UserTyping,
    // direct chat
    SendMessage,
    ChatMessage,
    NewChatMessage,
    TypingStart,
    TypingStop,
    JoinChatRoom,
    LeaveChatRoom,
    // status
    UserJoined,
    UserLeft,
    UserOnline,
    UserOffline,
    /// Anything else; kept so it can be logged by name.
    #[serde(untagged)]
    Other(String),
}

impl MessageType {
    /// Parse a bare kind name.
    pub fn from_wire(kind: &str) -> Self {
        serde_json::from_value(Value::String(kind.to_string()))
            .unwrap_or_else(|_| Self::Other(kind.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::JoinChannel => "join_channel",
            Self::LeaveChannel => "leave_channel",
            Self::SendChannelMessage => "send_channel_message",
            Self::GetChannelMessages => "get_channel_messages",
            Self::ChannelHistory => "messages_history",
            Self::NewMessage => "new_message",
            Self::UserTyping => "user_typing",
            Self::SendMessage => "send_message",
            Self::ChatMessage => "chat_message",
            Self::NewChatMessage => "new_chat_message",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::JoinChatRoom => "join_chat_room",
            Self::LeaveChatRoom => "leave_chat_room",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(
        default,
        deserialize_with = "deserialize_channel_id",
        skip_serializing_if = "ChannelId::is_unset"
    )]
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chat_room: String,
    #[serde(default, skip_serializing_if = "UserId::is_unset")]
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "UserId::is_unset")]
    pub receiver_id: UserId,
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pfp_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// An envelope of `kind` with every optional field empty.
    pub fn new(kind: MessageType, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            channel_id: ChannelId::default(),
            chat_room: String::new(),
            sender_id: UserId::default(),
            receiver_id: UserId::default(),
            user_id: UserId::default(),
            username: String::new(),
            content: String::new(),
            message_id: String::new(),
            created_at: String::new(),
            pfp_path: String::new(),
            data: None,
            timestamp,
        }
    }

    /// The user an event is attributed to. Fan-out never delivers back to them.
    pub fn origin(&self) -> UserId {
        if self.user_id.is_unset() {
            self.sender_id
        } else {
            self.user_id
        }
    }

    /// `data.typing` when present and boolean.
    pub fn typing_flag(&self) -> Option<bool> {
        self.data.as_ref()?.get("typing")?.as_bool()
    }
}

/// Normalize a loosely typed channel id.
///
/// Integers pass through, floats are truncated, strings must be a plain
/// base-10 integer. Anything else is `0`.
pub fn normalize_channel_id(raw: &Value) -> ChannelId {
    let value = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    ChannelId::new(value)
}

fn deserialize_channel_id<'de, D>(deserializer: D) -> Result<ChannelId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().map(normalize_channel_id).unwrap_or_default())
}

/// Wire codec failure.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one inbound frame.
pub fn decode(frame: &[u8]) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_slice(frame)?)
}

/// Encode one outbound frame.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}
