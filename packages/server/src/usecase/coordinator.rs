//! Hub Coordinator
//!
//! A single task that drains a bounded inbox and applies register,
//! unregister and command dispatch in arrival order. Connection pumps and
//! the HTTP layer talk to it only through [`HubHandle`].

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Connection, HubError, SubmitError};
use crate::infrastructure::dto::websocket::Envelope;

use super::hub::Hub;

/// Inbox message
#[derive(Debug)]
pub enum HubEvent {
    Register(Arc<Connection>),
    Unregister(Arc<Connection>),
    Command(Envelope),
}

/// Cloneable sender side of the coordinator inbox
#[derive(Clone)]
pub struct HubHandle {
    inbox: mpsc::Sender<HubEvent>,
    hub: Arc<Hub>,
}

impl HubHandle {
    /// Waits for inbox capacity; lifecycle events are never dropped.
    pub async fn register(&self, connection: Arc<Connection>) -> Result<(), HubError> {
        self.inbox
            .send(HubEvent::Register(connection))
            .await
            .map_err(|_| HubError::CoordinatorStopped)
    }

    pub async fn unregister(&self, connection: Arc<Connection>) -> Result<(), HubError> {
        self.inbox
            .send(HubEvent::Unregister(connection))
            .await
            .map_err(|_| HubError::CoordinatorStopped)
    }

    /// Non-blocking; a saturated inbox drops the command.
    pub fn submit(&self, envelope: Envelope) -> Result<(), SubmitError> {
        self.inbox
            .try_send(HubEvent::Command(envelope))
            .map_err(|e| match e {
                TrySendError::Full(HubEvent::Command(envelope)) => {
                    SubmitError::Full(envelope.kind.to_string())
                }
                TrySendError::Full(_) => SubmitError::Full(String::new()),
                TrySendError::Closed(_) => SubmitError::Closed,
            })
    }

    /// Direct access for paths that bypass the inbox (Broadcast Bridge).
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }
}

/// Start the coordinator task.
pub fn spawn(hub: Arc<Hub>) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(hub.config().inbox_capacity.max(1));
    let handle = HubHandle {
        inbox: tx,
        hub: Arc::clone(&hub),
    };
    let task = tokio::spawn(run(hub, rx));
    (handle, task)
}

async fn run(hub: Arc<Hub>, mut inbox: mpsc::Receiver<HubEvent>) {
    info!("hub coordinator started");
    while let Some(event) = inbox.recv().await {
        match event {
            HubEvent::Register(connection) => hub.register(connection).await,
            HubEvent::Unregister(connection) => hub.unregister(&connection).await,
            HubEvent::Command(envelope) => {
                debug!(kind = %envelope.kind, user_id = %envelope.sender_id, "dispatch");
                hub.dispatch(envelope).await;
            }
        }
    }
    warn!("hub coordinator stopped: all handles dropped");
}
