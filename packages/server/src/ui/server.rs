//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use super::{
    handler::{get_queue, get_session_detail, get_stats, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Support-chat broker server
///
/// # Example
///
/// ```ignore
/// let broker = Broker::new(config, message_pusher, archive, clock);
/// let server = Server::new(AppState::new(&broker));
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    app_state: Arc<AppState>,
}

impl Server {
    pub fn new(app_state: AppState) -> Self {
        Self {
            app_state: Arc::new(app_state),
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/queue", get(get_queue))
            .route("/api/sessions/{session_id}", get(get_session_detail))
            .route("/api/stats", get(get_stats))
            .layer(TraceLayer::new_for_http())
            .with_state(self.app_state.clone())
    }

    /// Bind to `host:port` and serve until Ctrl+C
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("Concierge broker listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?role=<citizen|admin>&external_id=<id>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
