//! Tether client binary: unlocks on demand via the local HTTP control
//! plane (§4.5, §6) rather than at process start — login happens through
//! `POST /api/login`.
//!
//! ## Usage
//!
//! ```bash
//! tether-client
//!
//! # With environment variables
//! SERVER_URL=ws://example.com/ws DATABASE_URL_CLIENT=sqlite://alt.db tether-client
//! ```
//!
//! ## Environment Variables
//!
//! - `SERVER_URL`: signaling server websocket URL
//! - `DATABASE_URL_CLIENT`: local SQLite database URL prefix
//! - `RUST_LOG`: `tracing_subscriber::EnvFilter` directive (default: `info`)

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::app::App;
use client::config::ClientConfig;

/// Tether end-to-end-encrypted peer-to-peer messenger client.
#[derive(Debug, Parser)]
#[command(name = "tether-client", version, about)]
struct Cli {
    /// Override the control plane bind address (e.g. 127.0.0.1:8080).
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    color_eyre::install().expect("failed to install panic/error reporting");

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match ClientConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Some(bind) = cli.bind {
        config.control_plane_addr = bind;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "tether-client starting");

    if let Err(e) = run(config).await {
        error!(error = %e, "client error");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> client::Result<()> {
    let bind_addr = config.control_plane_addr.parse().map_err(|_| client::Error::SchemaViolation {
        request_type: "config".to_string(),
        reason: format!("invalid control_plane_addr: {}", config.control_plane_addr),
    })?;

    let app = Arc::new(App::new(config));

    client::control_plane::serve(bind_addr, Arc::clone(&app)).await?;

    app.close().await;
    Ok(())
}
