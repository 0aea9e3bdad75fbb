//! WebSocket adapter — the wire surface for every request in §4.1's
//! catalog.
//!
//! Each upgraded connection gets two tasks: a writer that drains an
//! outbox (so the signaling engine can push unsolicited frames —
//! `share_offer_request`, `connection_establishment_request`, chat
//! pushes — from a *different* connection's handler), and a reader that
//! parses each text frame into an [`Envelope`] and calls
//! [`SignalingEngine::dispatch`]. Malformed JSON or an unknown `type`
//! closes only this socket (§7); any other error is reported back to
//! the caller as an `error` frame and the socket stays open.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

use crate::core::registry::SocketState;
use crate::domain::Envelope;
use crate::storage::{MessageRepository, UserRepository};
use crate::Error;

use super::http::routes::AppState;

pub async fn ws_upgrade<S: UserRepository + MessageRepository + 'static>(
    State(state): State<AppState<S>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<S: UserRepository + MessageRepository + 'static>(
    socket: WebSocket,
    state: AppState<S>,
) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<Envelope>();

    let writer = tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outbound envelope");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut socket_state = SocketState::default();

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "websocket transport error");
                break;
            }
        };

        let text = match frame {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed request, closing socket");
                break;
            }
        };

        let span = info_span!("request", user_id = socket_state.user_id.as_deref().unwrap_or("?"));
        let result = state
            .engine
            .dispatch(&mut socket_state, &outbox, envelope)
            .instrument(span)
            .await;

        match result {
            Ok(()) => {}
            Err(e) if e.closes_socket_only() => {
                warn!(error = %e, "closing socket after protocol error");
                break;
            }
            Err(e) => {
                warn!(error = %e, "request failed");
                let (error_type, message) = classify(&e);
                let _ = outbox.send(Envelope::server(
                    "error",
                    json!({"error_type": error_type, "message": message}),
                ));
            }
        }
    }

    state.engine.disconnect(&socket_state).await;
    if let Some(user_id) = &socket_state.user_id {
        info!(%user_id, "socket disconnected");
    }
    drop(outbox);
    let _ = writer.await;
}

fn classify(error: &Error) -> (&'static str, String) {
    match error {
        Error::UserNotRegistered(_) => ("user_not_registered", error.to_string()),
        _ => ("internal_error", error.to_string()),
    }
}
