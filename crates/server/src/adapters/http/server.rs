//! HTTP/WebSocket server bootstrap using Axum.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::core::SignalingEngine;
use crate::storage::{MessageRepository, UserRepository};

use super::routes::create_router;

/// Server handle for graceful shutdown.
pub struct HttpServer {
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    /// Bind and start serving. The returned handle keeps the listener
    /// alive until [`HttpServer::shutdown`] is called.
    pub async fn start<S: UserRepository + MessageRepository + 'static>(
        bind_addr: SocketAddr,
        engine: SignalingEngine<S>,
    ) -> std::io::Result<Self> {
        let app = create_router(engine)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(bind_addr).await?;
        info!(%bind_addr, "signaling server listening");

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .expect("HTTP server failed");
        });

        Ok(Self { shutdown_tx })
    }

    /// Signal the server to stop accepting new connections and give
    /// in-flight requests a moment to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
