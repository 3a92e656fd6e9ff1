//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::usecase::HubHandle;

use super::{
    handler::{broadcast_bridge, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// WebSocket hub server
///
/// # Example
///
/// ```ignore
/// let (handle, _coordinator) = agora_server::usecase::spawn(hub);
/// Server::new(handle).run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    hub: HubHandle,
}

impl Server {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    /// Routes: `/ws`, `/api/health`, `/api/broadcast`
    pub fn build_router(&self) -> Router {
        let app_state = Arc::new(AppState {
            hub: self.hub.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/broadcast", post(broadcast_bridge))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Bind to `host:port` and serve until Ctrl+C / SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or fails while serving.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Hub server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?user_id=<id>&username=<name>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.build_router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
