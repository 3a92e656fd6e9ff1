//! Broadcast Bridge DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::UserId;

use super::websocket::{Envelope, MessageType, normalize_channel_id};

/// Server-to-server broadcast request.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel_id: Value,
    /// Arbitrary object; `user_id` and `username` are used for attribution.
    #[serde(default)]
    pub message: Value,
}

impl BroadcastRequest {
    /// Translate into a hub envelope. The raw `message` object travels in `data`.
    pub fn into_envelope(self, now: DateTime<Utc>) -> Envelope {
        let mut envelope = Envelope::new(MessageType::from_wire(&self.kind), now);
        envelope.channel_id = normalize_channel_id(&self.channel_id);
        if let Some(fields) = self.message.as_object() {
            // JSON numbers from other services often arrive as floats
            envelope.user_id = fields
                .get("user_id")
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                .map(UserId::new)
                .unwrap_or_default();
            let text = |key: &str| {
                fields
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            envelope.username = text("username");
            envelope.content = text("content");
            envelope.pfp_path = text("pfp_path");
            envelope.created_at = text("created_at");
            envelope.message_id = match fields.get("message_id") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            };
        }
        if !self.message.is_null() {
            envelope.data = Some(self.message);
        }
        envelope
    }
}

/// Bridge acknowledgment body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAck {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BroadcastAck {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}
