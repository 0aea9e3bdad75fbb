//! Route table: the `/ws` signaling endpoint plus an ambient health check.

use axum::routing::get;
use axum::Router;

use crate::core::SignalingEngine;
use crate::storage::{MessageRepository, UserRepository};

use super::health;

/// Shared state for every Axum handler. Manually implements `Clone`
/// (rather than deriving it) so it doesn't require `S: Clone` — only
/// `SignalingEngine<S>` itself needs to be cheaply cloneable, and it
/// already is regardless of `S`.
pub struct AppState<S> {
    pub engine: SignalingEngine<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

pub fn create_router<S: UserRepository + MessageRepository + 'static>(
    engine: SignalingEngine<S>,
) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ws", get(crate::adapters::ws::ws_upgrade::<S>))
        .with_state(state)
}
