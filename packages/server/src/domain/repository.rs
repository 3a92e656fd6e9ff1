//! Collaborator ports.
//!
//! The hub never talks to a database directly; it depends on these traits and
//! the infrastructure layer provides the implementations.

use async_trait::async_trait;

use super::{
    error::StoreError,
    message::{NewChannelMessage, NewDirectMessage, PersistedMessage, UserDisplay},
    value::{ChannelId, MessageId, UserId},
};

/// Durable message storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a channel message and return its generated id.
    async fn insert_channel_message(
        &self,
        message: NewChannelMessage,
    ) -> Result<MessageId, StoreError>;

    /// Insert a direct message and return its generated id.
    async fn insert_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<MessageId, StoreError>;

    /// The newest `limit` non-deleted messages of a channel, oldest first.
    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> Result<Vec<PersistedMessage>, StoreError>;

    /// Username and avatar path of a user.
    async fn fetch_user_display(&self, user_id: UserId) -> Result<UserDisplay, StoreError>;
}

/// Channel-access authorization.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Whether the user is an active member of the community owning the channel.
    async fn has_access(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool, StoreError>;
}
