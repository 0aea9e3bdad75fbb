//! Local HTTP control plane (§6): the surface a local UI talks to instead
//! of the websocket/webrtc machinery directly. Bound to
//! `ClientConfig::control_plane_addr` (127.0.0.1 by default).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::{AddChatOutcome, App};
use crate::domain::Message;
use crate::Error;

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    /// `UserNotRegistered` doubles as the session/authorization failure
    /// (§6: a `user_id` mismatch against the active session returns 403);
    /// everything else is an unexpected server-side failure.
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UserNotRegistered(_) => StatusCode::FORBIDDEN,
            Error::SchemaViolation { .. } | Error::IncorrectRequestType(_) | Error::Rejected(_) => StatusCode::BAD_REQUEST,
            Error::ConnectionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    user_id: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    user_id: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ResolveUserIdRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct AddChatRequest {
    user_id: String,
    target_user_id: String,
}

#[derive(Debug, Serialize)]
struct AddChatResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    user_id: String,
    target_user_id: String,
    content: String,
}

async fn register(State(app): State<Arc<App>>, Json(req): Json<RegisterRequest>) -> ApiResult<serde_json::Value> {
    app.register(&req.user_id, &req.email, &req.password).await?;
    Ok(Json(json!({"status": "ok"})))
}

async fn resolve_user_id(State(app): State<Arc<App>>, Json(req): Json<ResolveUserIdRequest>) -> ApiResult<serde_json::Value> {
    let user_id = app.resolve_user_id(&req.email, &req.password).await?;
    Ok(Json(json!({"user_id": user_id})))
}

async fn login(State(app): State<Arc<App>>, Json(req): Json<LoginRequest>) -> ApiResult<serde_json::Value> {
    app.login(&req.user_id, &req.password).await?;
    Ok(Json(json!({"status": "ok"})))
}

async fn chats_loaded(State(app): State<Arc<App>>) -> Json<serde_json::Value> {
    Json(json!({"chats_loaded": app.chats_loaded().await}))
}

async fn get_chats(State(app): State<Arc<App>>, Path(user_id): Path<String>) -> ApiResult<Vec<String>> {
    Ok(Json(app.list_chats(&user_id).await?))
}

async fn add_chat(State(app): State<Arc<App>>, Json(req): Json<AddChatRequest>) -> ApiResult<AddChatResponse> {
    let status = match app.add_chat(&req.user_id, &req.target_user_id).await? {
        AddChatOutcome::Created => "ok",
        AddChatOutcome::InvalidUserId => "invalid_user_id",
    };
    Ok(Json(AddChatResponse { status }))
}

async fn new_chats(State(app): State<Arc<App>>) -> ApiResult<Vec<String>> {
    Ok(Json(app.new_chats().await?))
}

async fn get_messages(
    State(app): State<Arc<App>>,
    Path((user_id, target_user_id)): Path<(String, String)>,
) -> ApiResult<Vec<Message>> {
    Ok(Json(app.get_messages(&user_id, &target_user_id).await?))
}

async fn get_new_messages(
    State(app): State<Arc<App>>,
    Path((user_id, target_user_id, since)): Path<(String, String, String)>,
) -> ApiResult<Vec<Message>> {
    Ok(Json(app.get_new_messages(&user_id, &target_user_id, &since).await?))
}

async fn send_message(State(app): State<Arc<App>>, Json(req): Json<SendMessageRequest>) -> ApiResult<serde_json::Value> {
    app.send_message(&req.user_id, &req.target_user_id, &req.content).await?;
    Ok(Json(json!({"status": "ok"})))
}

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/resolve_user_id", post(resolve_user_id))
        .route("/api/login", post(login))
        .route("/api/chats_loaded", get(chats_loaded))
        .route("/api/get_chats/{user_id}", get(get_chats))
        .route("/api/add_chat", post(add_chat))
        .route("/api/new_chats", get(new_chats))
        .route("/api/get_messages/{user_id}/{target_user_id}", get(get_messages))
        .route("/api/get_new_messages/{user_id}/{target_user_id}/{since}", get(get_new_messages))
        .route("/api/send_message", post(send_message))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// Bind and serve the control plane, returning once the listener is
/// accepting connections. Runs until the process exits — there is no
/// remote client that needs graceful shutdown coordination (§5).
pub async fn serve(bind_addr: SocketAddr, app: Arc<App>) -> crate::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "control plane listening");
    axum::serve(listener, router(app)).await?;
    Ok(())
}
