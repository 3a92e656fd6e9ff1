//! Error types for the hub.

use thiserror::Error;

/// Handshake query parameters were missing or malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing user_id")]
    MissingUserId,

    #[error("invalid user_id '{0}'")]
    InvalidUserId(String),

    #[error("missing username")]
    MissingUsername,
}

/// A command could not be handed to the coordinator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Inbox saturated; the command was dropped.
    #[error("coordinator inbox is full, dropped '{0}'")]
    Full(String),

    #[error("coordinator has stopped")]
    Closed,
}

/// The coordinator is gone.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("coordinator is not running")]
    CoordinatorStopped,
}

/// Failures of the storage / authorization collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid stored value: {0}")]
    InvalidData(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}
