//! Control plane router wiring (§6): every authenticated endpoint must
//! reject requests against an App with no active session, rather than
//! panicking or leaking internal state — this is the session-mismatch
//! branch of the same 403 gate that later protects a logged-in session's
//! data from a different `user_id`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use client::app::App;
use client::config::ClientConfig;
use client::control_plane::router;

fn app() -> Arc<App> {
    Arc::new(App::new(ClientConfig::default()))
}

#[tokio::test]
async fn chats_loaded_reports_false_before_login() {
    let router = router(app());
    let response = router
        .oneshot(Request::builder().uri("/api/chats_loaded").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["chats_loaded"], false);
}

#[tokio::test]
async fn get_chats_without_a_session_is_forbidden() {
    let router = router(app());
    let response = router
        .oneshot(Request::builder().uri("/api/get_chats/alice").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// `register`/`resolve_user_id` talk to the signaling server directly
/// (there's no session yet to gate on); against an unreachable server
/// they must surface as an ordinary 500, never panic the handler.
#[tokio::test]
async fn register_against_an_unreachable_server_fails_cleanly() {
    let router = router(app());
    let body = serde_json::json!({
        "user_id": "alice",
        "email": "alice@example.com",
        "password": "hunter2",
    })
    .to_string();
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/register")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn send_message_without_a_session_is_forbidden() {
    let router = router(app());
    let body = serde_json::json!({"user_id": "alice", "target_user_id": "bob", "content": "hi"}).to_string();
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/send_message")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
