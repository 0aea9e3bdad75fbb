//! Liveness probe — ambient, not part of the signaling protocol.

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
