//! Connection pump: one reader and one writer task per connection.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use chrono::{DateTime, Utc};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{Instant, interval_at, timeout},
};

use crate::{
    domain::{Connection, Identity, OutboundReceiver, SubmitError},
    infrastructure::dto::websocket::{Envelope, decode},
    usecase::HubHandle,
};

#[derive(Debug, Error)]
enum WriteError {
    #[error("transport: {0}")]
    Transport(#[from] axum::Error),
    #[error("write deadline exceeded")]
    Deadline,
}

/// Overwrite the wire-supplied identity with the authenticated one.
pub(crate) fn stamp(mut envelope: Envelope, identity: &Identity, now: DateTime<Utc>) -> Envelope {
    envelope.sender_id = identity.user_id;
    envelope.user_id = identity.user_id;
    envelope.username = identity.username.clone();
    envelope.pfp_path = identity.pfp_path.clone();
    envelope.timestamp = now;
    envelope
}

/// Decode inbound frames and hand them to the coordinator.
///
/// Any inbound frame renews the `pong_wait` read deadline. Malformed frames
/// are skipped; a saturated inbox drops the command.
pub fn spawn_reader(
    mut receiver: SplitStream<WebSocket>,
    connection: Arc<Connection>,
    hub: HubHandle,
    pong_wait: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let user_id = connection.user_id();
        loop {
            let msg = match timeout(pong_wait, receiver.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::debug!(%user_id, "WebSocket read error: {}", e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::info!(%user_id, "read deadline exceeded, closing connection");
                    break;
                }
            };

            let envelope = match &msg {
                Message::Text(text) => decode(text.as_str().as_bytes()),
                Message::Binary(bytes) => decode(bytes),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    tracing::debug!(%user_id, "client requested close");
                    break;
                }
            };
            let envelope = match envelope {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(%user_id, "Skipping frame: {}", e);
                    continue;
                }
            };

            let envelope = stamp(envelope, connection.identity(), hub.hub().now());
            match hub.submit(envelope) {
                Ok(()) => {}
                Err(e @ SubmitError::Full(_)) => tracing::warn!(%user_id, "{}", e),
                Err(e @ SubmitError::Closed) => {
                    tracing::error!(%user_id, "{}", e);
                    break;
                }
            }
        }
    })
}

/// Drain the outbound queue and keep the connection alive with pings.
///
/// The ping timer restarts after every write, so pings go out only on idle
/// connections. A closed queue sends a close frame and ends the task.
pub fn spawn_writer(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: OutboundReceiver,
    ping_interval: Duration,
    write_wait: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(frame) => {
                        let msg = Message::Text(frame.to_string().into());
                        if let Err(e) = write(&mut sender, msg, write_wait).await {
                            tracing::debug!("Write failed: {}", e);
                            break;
                        }
                        ticker.reset();
                    }
                    None => {
                        let _ = write(&mut sender, Message::Close(None), write_wait).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if let Err(e) = write(&mut sender, Message::Ping(Bytes::new()), write_wait).await {
                        tracing::debug!("Ping failed: {}", e);
                        break;
                    }
                }
            }
        }
    })
}

async fn write(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: Message,
    write_wait: Duration,
) -> Result<(), WriteError> {
    timeout(write_wait, sender.send(msg))
        .await
        .map_err(|_| WriteError::Deadline)??;
    Ok(())
}
