//! End-to-end websocket tests against a live server instance, exercising
//! the request catalog the way two real clients would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use server::adapters::http::HttpServer;
use server::core::{Registry, SignalingEngine};
use server::domain::{StoredMessage, User};
use server::storage::{MessageRepository, UserRepository};
use server::Result;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeStorage {
    users: StdMutex<HashMap<String, User>>,
    long_term_keys: StdMutex<HashMap<String, String>>,
    spool: StdMutex<Vec<StoredMessage>>,
}

#[async_trait]
impl UserRepository for FakeStorage {
    async fn create(&self, user_id: &str, email: &str, password_hash: &str) -> Result<()> {
        self.users
            .lock()
            .unwrap()
            .insert(user_id.to_string(), User::new(user_id, email, password_hash));
        Ok(())
    }

    async fn find_by_credentials(&self, _email: &str, _password_hash: &str) -> Result<Option<User>> {
        Ok(None)
    }

    async fn exists(&self, user_id: &str) -> Result<bool> {
        Ok(self.users.lock().unwrap().contains_key(user_id))
    }

    async fn set_long_term_public_key(&self, user_id: &str, public_key: &str) -> Result<()> {
        self.long_term_keys
            .lock()
            .unwrap()
            .insert(user_id.to_string(), public_key.to_string());
        Ok(())
    }

    async fn get_long_term_public_key(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.long_term_keys.lock().unwrap().get(user_id).cloned())
    }
}

#[async_trait]
impl MessageRepository for FakeStorage {
    async fn insert(&self, user_id: &str, target_user_id: &str, ciphertext: &str) -> Result<()> {
        self.spool
            .lock()
            .unwrap()
            .push(StoredMessage::pending(user_id, target_user_id, ciphertext));
        Ok(())
    }

    async fn drain(&self, sender: &str, recipient: &str) -> Result<Vec<StoredMessage>> {
        let mut spool = self.spool.lock().unwrap();
        let (matching, rest): (Vec<_>, Vec<_>) = spool
            .drain(..)
            .partition(|m| m.user_id == sender && m.target_user_id == recipient);
        *spool = rest;
        Ok(matching)
    }
}

/// Start a server on an OS-assigned port, returning the `ws://` base URL.
async fn spawn_server() -> (String, HttpServer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let storage = Arc::new(FakeStorage::default());
    let engine = SignalingEngine::new(storage, Registry::new());
    let handle = HttpServer::start(addr, engine).await.unwrap();

    (format!("ws://{addr}/ws"), handle)
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn send_json(socket: &mut WsStream, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn recv_json(socket: &mut WsStream) -> Value {
    let frame = timeout(TEST_TIMEOUT, socket.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("socket closed")
        .expect("transport error");
    match frame {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn add_user_then_register_online_peers() {
    let (url, _server) = spawn_server().await;

    let (mut alice, _) = connect_async(&url).await.unwrap();
    let (mut bob, _) = connect_async(&url).await.unwrap();

    send_json(
        &mut alice,
        json!({"type": "add_user_to_data_base", "user_id": null, "content": {"user_id": "alice", "email": "alice@example.com", "password": "hash"}}),
    )
    .await;
    let response = recv_json(&mut alice).await;
    assert_eq!(response["content"]["status"], "success");

    send_json(
        &mut alice,
        json!({"type": "login_request", "user_id": "alice", "content": {"long_term_public_key": "alice-ltpk"}}),
    )
    .await;
    let created = recv_json(&mut alice).await;
    assert_eq!(created["type"], "created_chats");

    send_json(
        &mut bob,
        json!({"type": "register_request", "user_id": "bob", "content": {"target_user_id": "alice", "public_key": "bob-pk"}}),
    )
    .await;
    let spooled = recv_json(&mut bob).await;
    assert_eq!(spooled["type"], "send_stored_messages");
    let status = recv_json(&mut bob).await;
    assert_eq!(status["content"]["register_response_type"], "target_user_offline");
}

#[tokio::test]
async fn offline_relay_is_spooled_and_delivered_on_register() {
    let (url, _server) = spawn_server().await;

    let (mut alice, _) = connect_async(&url).await.unwrap();
    send_json(
        &mut alice,
        json!({"type": "relay_message_request", "user_id": "alice", "content": {"target_user": "bob", "message": "ciphertext-hello"}}),
    )
    .await;

    let (mut bob, _) = connect_async(&url).await.unwrap();
    send_json(
        &mut bob,
        json!({"type": "register_request", "user_id": "bob", "content": {"target_user_id": "alice", "public_key": "bob-pk"}}),
    )
    .await;

    let spooled = recv_json(&mut bob).await;
    assert_eq!(spooled["type"], "send_stored_messages");
    assert_eq!(spooled["content"]["message"], json!(["ciphertext-hello"]));
}

#[tokio::test]
async fn unknown_request_type_closes_only_that_socket() {
    let (url, _server) = spawn_server().await;

    let (mut alice, _) = connect_async(&url).await.unwrap();
    send_json(&mut alice, json!({"type": "not_a_real_request", "user_id": "alice", "content": {}})).await;

    let result = timeout(TEST_TIMEOUT, alice.next()).await.unwrap();
    match result {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("expected the socket to close, got {other:?}"),
    }
}
