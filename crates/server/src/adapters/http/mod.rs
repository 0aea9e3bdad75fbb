//! # HTTP Adapter
//!
//! The server's only HTTP surface is ambient: a health check for
//! deployment probes and the `/ws` upgrade route (`crate::adapters::ws`)
//! mounted on the same Axum router.
//!
//! ## Components
//!
//! - `server`: Axum server bootstrap.
//! - `routes`: route table (`/health`, `/ws`).
//! - `health`: liveness handler.

pub mod health;
pub mod routes;
pub mod server;

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Port to listen on.
    pub port: u16,
}
