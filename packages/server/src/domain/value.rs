//! Value objects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Authenticated user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// `0` is the wire encoding for "absent".
    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical channel identifier.
///
/// The wire accepts loose encodings; they are normalized into this type at the
/// codec boundary and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(i64);

impl ChannelId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// Channels that can be joined have a positive id.
    pub const fn is_joinable(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a persisted message, assigned by the storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a 1:1 chat room (e.g. `user_1_user_2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatRoomKey(String);

impl ChatRoomKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Canonical key for the pair, independent of who is sender and receiver.
    pub fn for_pair(a: UserId, b: UserId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("user_{}_user_{}", low, high))
    }

    /// Use the explicit room name when the client sent one, otherwise derive it.
    pub fn resolve(explicit: &str, a: UserId, b: UserId) -> Self {
        if explicit.is_empty() {
            Self::for_pair(a, b)
        } else {
            Self::new(explicit)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatRoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated identity of a connection, taken from the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
    pub pfp_path: String,
}

impl Identity {
    pub fn new(user_id: UserId, username: impl Into<String>, pfp_path: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            pfp_path: pfp_path.into(),
        }
    }
}
