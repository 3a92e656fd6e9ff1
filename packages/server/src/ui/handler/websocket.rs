//! WebSocket connection handler.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::stream::StreamExt;
use serde::Deserialize;

use crate::{
    domain::{Connection, HandshakeError, Identity, UserId},
    ui::state::AppState,
};

use super::pump::{spawn_reader, spawn_writer};

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub pfp_path: Option<String>,
}

impl ConnectQuery {
    /// Validate the handshake parameters. `pfp_path` is optional.
    pub fn into_identity(self) -> Result<Identity, HandshakeError> {
        let raw_id = self
            .user_id
            .filter(|v| !v.trim().is_empty())
            .ok_or(HandshakeError::MissingUserId)?;
        let user_id = raw_id
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| HandshakeError::InvalidUserId(raw_id.clone()))?;
        let username = self
            .username
            .filter(|v| !v.is_empty())
            .ok_or(HandshakeError::MissingUsername)?;
        Ok(Identity::new(
            UserId::new(user_id),
            username,
            self.pfp_path.unwrap_or_default(),
        ))
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let identity = match query.into_identity() {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("Rejected WebSocket handshake: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    tracing::debug!(
        user_id = %identity.user_id,
        username = %identity.username,
        "upgrading connection"
    );
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let hub = state.hub.hub();
    let config = hub.config().clone();
    let (connection, rx) = Connection::new(identity, config.outbound_capacity, hub.now());

    if let Err(e) = state.hub.register(Arc::clone(&connection)).await {
        tracing::error!(user_id = %connection.user_id(), "Failed to register connection: {}", e);
        return;
    }

    let (sender, receiver) = socket.split();

    // Spawn a task to drain this connection's outbound queue
    let mut send_task = spawn_writer(sender, rx, config.ping_interval(), config.write_wait());

    // Spawn a task to receive commands from this client
    let mut recv_task = spawn_reader(
        receiver,
        Arc::clone(&connection),
        state.hub.clone(),
        config.pong_wait(),
    );

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    if let Err(e) = state.hub.unregister(Arc::clone(&connection)).await {
        tracing::warn!(user_id = %connection.user_id(), "Failed to unregister connection: {}", e);
    }
}
