//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use crate::{
    infrastructure::dto::http::{BroadcastAck, BroadcastRequest},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Broadcast Bridge
///
/// Acknowledges immediately; the fan-out runs in a spawned task.
pub async fn broadcast_bridge(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BroadcastRequest>, JsonRejection>,
) -> (StatusCode, Json<BroadcastAck>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("Rejected broadcast request: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(BroadcastAck::error(rejection.body_text())),
            );
        }
    };

    let hub = Arc::clone(state.hub.hub());
    let mut envelope = request.into_envelope(hub.now());
    tracing::debug!(
        kind = %envelope.kind,
        channel_id = %envelope.channel_id,
        user_id = %envelope.user_id,
        "bridge broadcast accepted"
    );

    let _ = tokio::spawn(async move {
        if envelope.username.is_empty() && !envelope.user_id.is_unset() {
            let display = hub.user_display(envelope.user_id).await;
            envelope.username = display.username;
            if envelope.pfp_path.is_empty() {
                envelope.pfp_path = display.pfp_path;
            }
        }
        hub.broadcast_to_channel(envelope).await;
    });

    (StatusCode::OK, Json(BroadcastAck::success()))
}
