//! Signaling/relay server binary: a single websocket endpoint plus an
//! ambient health check (§4.1, §6).
//!
//! ## Usage
//!
//! ```bash
//! tether-server
//!
//! # With environment variables
//! DATABASE_URL=postgres://localhost/tether SERVER_BIND_ADDR=0.0.0.0:9000 tether-server
//! ```
//!
//! ## Environment Variables
//!
//! - `SERVER_BIND_ADDR`: websocket/HTTP bind address (default: `0.0.0.0:9000`)
//! - `DATABASE_URL`: Postgres connection string
//! - `RUST_LOG`: `tracing_subscriber::EnvFilter` directive (default: `info`)

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::adapters::http::HttpServer;
use server::config::ServerConfig;
use server::core::{Registry, SignalingEngine};
use server::storage::PostgresStorage;

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log).unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tether-server starting");

    if let Err(e) = run(config).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> server::Result<()> {
    let bind_addr = config.bind_addr.parse().map_err(|_| {
        server::Error::SchemaViolation {
            request_type: "config".to_string(),
            reason: format!("invalid bind_addr: {}", config.bind_addr),
        }
    })?;

    info!("connecting to storage");
    let storage = Arc::new(PostgresStorage::connect(&config.database_url).await?);

    let engine = SignalingEngine::new(storage, Registry::new());

    let http_server = HttpServer::start(bind_addr, engine).await?;

    info!(%bind_addr, "ready");

    shutdown_signal().await;
    info!("shutdown signal received");

    http_server.shutdown().await;
    info!("stopped");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
