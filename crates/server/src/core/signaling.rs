//! Signaling engine — the request catalog of §4.1, dispatched by `type`.
//!
//! One [`SignalingEngine`] is shared (via `Arc`) across every open
//! websocket; all mutable state lives in its [`Registry`] and the
//! storage backend, so handling is safe to call concurrently from many
//! connection tasks.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::domain::Envelope;
use crate::storage::{MessageRepository, UserRepository};
use crate::{Error, Result};

use super::registry::{Outbox, Registry, SocketRole, SocketState};

/// Dispatches one request type at a time; see `dispatch` for the match
/// against §4.1's table.
pub struct SignalingEngine<S> {
    storage: Arc<S>,
    registry: Registry,
}

impl<S> Clone for SignalingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            registry: self.registry.clone(),
        }
    }
}

fn field<'a>(value: &'a serde_json::Value, name: &str, request_type: &str) -> Result<&'a str> {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::SchemaViolation {
            request_type: request_type.to_string(),
            reason: format!("missing or non-string field `{name}`"),
        })
}

impl<S: UserRepository + MessageRepository + 'static> SignalingEngine<S> {
    pub fn new(storage: Arc<S>, registry: Registry) -> Self {
        Self { storage, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatch one incoming frame. `outbox` is this socket's own sender;
    /// `state` is this socket's registration state, mutated here when a
    /// frame binds the socket (`login_request`, `register_request`).
    pub async fn dispatch(
        &self,
        state: &mut SocketState,
        outbox: &Outbox,
        envelope: Envelope,
    ) -> Result<()> {
        let request_type = envelope.kind.clone();
        debug!(request_type = %request_type, "dispatching request");

        match request_type.as_str() {
            "add_user_to_data_base" => self.add_user_to_data_base(outbox, &envelope.content).await,
            "get_user_info_from_data_base" => {
                self.get_user_info_from_data_base(outbox, &envelope.content).await
            }
            "login_request" => self.login_request(state, outbox, envelope).await,
            "check_user_existance_request" => {
                self.check_user_existance_request(outbox, &envelope.content).await
            }
            "register_request" => self.register_request(state, outbox, envelope).await,
            "get_target_user_status_request" => {
                self.get_target_user_status_request(&envelope, outbox).await
            }
            "connection_request" => self.connection_request(&envelope, outbox).await,
            "share_offer_request" => self.share_offer_request(&envelope).await,
            "share_answer_request" => self.share_answer_request(&envelope).await,
            "relay_message_request" => self.relay_message_request(&envelope).await,
            "create_chat_request" => self.create_chat_request(&envelope).await,
            "get_long_term_public_key_request" => {
                self.get_long_term_public_key_request(outbox, &envelope.content).await
            }
            "send_long_term_public_key_request" => {
                self.send_long_term_public_key_request(&envelope).await
            }
            other => Err(Error::IncorrectRequestType(other.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Account management
    // ------------------------------------------------------------------

    async fn add_user_to_data_base(&self, outbox: &Outbox, content: &serde_json::Value) -> Result<()> {
        let user_id = field(content, "user_id", "add_user_to_data_base")?;
        let email = field(content, "email", "add_user_to_data_base")?;
        let password = field(content, "password", "add_user_to_data_base")?;

        let response = if self.storage.exists(user_id).await? {
            Envelope::server(
                "add_user_to_data_base_response",
                json!({"status": "error", "message": "username or email already exists"}),
            )
        } else {
            self.storage.create(user_id, email, password).await?;
            Envelope::server(
                "add_user_to_data_base_response",
                json!({"status": "success", "message": "user successfully added"}),
            )
        };
        let _ = outbox.send(response);
        Ok(())
    }

    async fn get_user_info_from_data_base(
        &self,
        outbox: &Outbox,
        content: &serde_json::Value,
    ) -> Result<()> {
        let email = field(content, "email", "get_user_info_from_data_base")?;
        let password = field(content, "password", "get_user_info_from_data_base")?;

        let response = match self.storage.find_by_credentials(email, password).await? {
            Some(user) => Envelope::server(
                "get_user_info_from_data_base_response",
                json!({"status": "success", "user_id": user.user_id}),
            ),
            None => Envelope::server(
                "get_user_info_from_data_base_response",
                json!({"status": "error", "message": "invalid email or password"}),
            ),
        };
        let _ = outbox.send(response);
        Ok(())
    }

    async fn check_user_existance_request(
        &self,
        outbox: &Outbox,
        content: &serde_json::Value,
    ) -> Result<()> {
        let target_user_id = field(content, "target_user_id", "check_user_existance_request")?;
        let exists = self.storage.exists(target_user_id).await?;
        let _ = outbox.send(Envelope::server(
            "check_user_existance_request",
            json!({"target_user_id": target_user_id, "user_existance": exists}),
        ));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    async fn login_request(
        &self,
        state: &mut SocketState,
        outbox: &Outbox,
        envelope: Envelope,
    ) -> Result<()> {
        let user_id = envelope.user_id.clone().ok_or_else(|| Error::SchemaViolation {
            request_type: "login_request".into(),
            reason: "missing user_id".into(),
        })?;
        let public_key = field(&envelope.content, "long_term_public_key", "login_request")?;

        self.storage.set_long_term_public_key(&user_id, public_key).await?;
        let (conn_id, created_chats) = self.registry.register_main(&user_id, outbox.clone()).await;

        state.user_id = Some(user_id.clone());
        state.role = SocketRole::Main { conn_id };

        let _ = outbox.send(Envelope::server(
            "created_chats",
            json!({"created_chats": created_chats}),
        ));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Per-chat socket registration + offline spool drain
    // ------------------------------------------------------------------

    async fn register_request(
        &self,
        state: &mut SocketState,
        outbox: &Outbox,
        envelope: Envelope,
    ) -> Result<()> {
        let user_id = envelope.user_id.clone().ok_or_else(|| Error::SchemaViolation {
            request_type: "register_request".into(),
            reason: "missing user_id".into(),
        })?;
        let target_user_id = field(&envelope.content, "target_user_id", "register_request")?.to_string();
        let public_key = field(&envelope.content, "public_key", "register_request")?.to_string();

        let conn_id = self
            .registry
            .register_chat(&user_id, &target_user_id, outbox.clone(), public_key)
            .await;
        state.user_id = Some(user_id.clone());
        state.role = SocketRole::Chat {
            target_user_id: target_user_id.clone(),
            conn_id,
        };

        // Offline spool: everything `target_user_id` sent to `user_id`
        // while `user_id` was offline, oldest first, deleted atomically
        // (§4.1 "Offline spool semantics", §8 "Spool atomicity").
        let stored = self.storage.drain(&target_user_id, &user_id).await?;
        let ciphertexts: Vec<String> = stored.into_iter().map(|m| m.ciphertext).collect();
        let _ = outbox.send(Envelope::server(
            "send_stored_messages",
            json!({"message": ciphertexts}),
        ));

        // Was `target_user_id` waiting to reach `user_id` while `user_id`
        // was offline? Resolve the pending pair (§4.1 role assignment,
        // §8 scenario 3).
        if self.registry.is_pending_peer(&user_id, &target_user_id).await {
            self.registry.resolve_pending(&user_id, &target_user_id).await;

            let peer_public_key = self
                .registry
                .chat_public_key(&target_user_id, &user_id)
                .await;

            let _ = outbox.send(Envelope::server(
                "register_response",
                json!({
                    "register_response_type": "connection_establishment_request",
                    "user_id": target_user_id,
                    "role": "answer",
                    "public_key": peer_public_key,
                }),
            ));

            let my_public_key = self.registry.chat_public_key(&user_id, &target_user_id).await;
            self.registry
                .send_to_chat(
                    &target_user_id,
                    &user_id,
                    Envelope::server(
                        "connection_establishment_request",
                        json!({"user_id": user_id, "role": "offer", "public_key": my_public_key}),
                    ),
                )
                .await;
        } else if self.registry.is_online_for_chat(&target_user_id, &user_id).await {
            let _ = outbox.send(Envelope::server(
                "register_response",
                json!({"register_response_type": "target_user_online"}),
            ));
        } else {
            let _ = outbox.send(Envelope::server(
                "register_response",
                json!({"register_response_type": "target_user_offline"}),
            ));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Peer-status probe, over an already-open chat socket
    // ------------------------------------------------------------------

    async fn get_target_user_status_request(&self, envelope: &Envelope, outbox: &Outbox) -> Result<()> {
        let target_user_id =
            field(&envelope.content, "target_user_id", "get_target_user_status_request")?;
        let user_id = envelope.user_id.as_deref().unwrap_or_default();

        let online = self.registry.is_online_for_chat(target_user_id, user_id).await;
        let public_key = if online {
            self.registry.chat_public_key(target_user_id, user_id).await
        } else {
            None
        };

        let _ = outbox.send(Envelope::server(
            "target_user_status_response",
            json!({"target_user_status": online, "public_key": public_key}),
        ));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connection request + role assignment (§4.1 "Role assignment policy")
    // ------------------------------------------------------------------

    async fn connection_request(&self, envelope: &Envelope, outbox: &Outbox) -> Result<()> {
        let user_id = envelope.user_id.clone().ok_or_else(|| Error::SchemaViolation {
            request_type: "connection_request".into(),
            reason: "missing user_id".into(),
        })?;
        let target_user_id =
            field(&envelope.content, "target_user_id", "connection_request")?.to_string();

        if user_id == target_user_id {
            return Err(Error::SchemaViolation {
                request_type: "connection_request".into(),
                reason: "target_user_id must not equal the caller".into(),
            });
        }

        if !self.storage.exists(&target_user_id).await? {
            let _ = outbox.send(Envelope::server(
                "connection_response",
                json!({"connection_response_type": "user_not_registered_error"}),
            ));
            return Ok(());
        }

        if self.registry.is_online_for_chat(&target_user_id, &user_id).await {
            // Both sides present: break ties deterministically so two
            // simultaneous `connection_request`s never disagree on roles
            // (§4.1 "Tie-break").
            let (my_role, their_role) = if user_id < target_user_id {
                ("offer", "answer")
            } else {
                ("answer", "offer")
            };

            let my_public_key = self.registry.chat_public_key(&user_id, &target_user_id).await;
            let their_public_key = self.registry.chat_public_key(&target_user_id, &user_id).await;

            self.registry
                .send_to_chat(
                    &target_user_id,
                    &user_id,
                    Envelope::server(
                        "connection_establishment_request",
                        json!({"user_id": user_id, "role": their_role, "public_key": my_public_key}),
                    ),
                )
                .await;

            let _ = outbox.send(Envelope::server(
                "connection_response",
                json!({
                    "connection_response_type": "connection_establishment_request",
                    "role": my_role,
                    "user_id": target_user_id,
                    "public_key": their_public_key,
                }),
            ));
        } else {
            self.registry.mark_pending(&user_id, &target_user_id).await;
            let _ = outbox.send(Envelope::server(
                "connection_response",
                json!({"connection_response_type": "target_user_offline"}),
            ));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // SDP relay
    // ------------------------------------------------------------------

    async fn share_offer_request(&self, envelope: &Envelope) -> Result<()> {
        let user_id = envelope.user_id.as_deref().unwrap_or_default();
        let target_user_id = field(&envelope.content, "target_user_id", "share_offer_request")?;
        let offer = envelope
            .content
            .get("offer")
            .cloned()
            .ok_or_else(|| Error::SchemaViolation {
                request_type: "share_offer_request".into(),
                reason: "missing offer".into(),
            })?;

        // §8 Boundaries: if the peer's chat socket isn't known, drop with
        // an error to the sender rather than panicking on a missing slot.
        if !self
            .registry
            .send_to_chat(
                target_user_id,
                user_id,
                Envelope::server("share_offer_request", json!({"user_id": user_id, "offer": offer})),
            )
            .await
        {
            warn!(%target_user_id, "share_offer_request dropped: peer socket not open");
            return Err(Error::UserNotRegistered(target_user_id.to_string()));
        }
        Ok(())
    }

    async fn share_answer_request(&self, envelope: &Envelope) -> Result<()> {
        let user_id = envelope.user_id.as_deref().unwrap_or_default();
        let target_user_id = field(&envelope.content, "target_user_id", "share_answer_request")?;
        let answer = envelope
            .content
            .get("answer")
            .cloned()
            .ok_or_else(|| Error::SchemaViolation {
                request_type: "share_answer_request".into(),
                reason: "missing answer".into(),
            })?;

        if !self
            .registry
            .send_to_chat(
                target_user_id,
                user_id,
                Envelope::server("share_answer_request", json!({"user_id": user_id, "answer": answer})),
            )
            .await
        {
            warn!(%target_user_id, "share_answer_request dropped: peer socket not open");
            return Err(Error::UserNotRegistered(target_user_id.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relay / offline spool
    // ------------------------------------------------------------------

    async fn relay_message_request(&self, envelope: &Envelope) -> Result<()> {
        let user_id = envelope.user_id.clone().unwrap_or_default();
        let target_user_id = field(&envelope.content, "target_user", "relay_message_request")?.to_string();
        let message = field(&envelope.content, "message", "relay_message_request")?.to_string();
        let public_key = envelope.content.get("public_key").cloned();

        if self.registry.is_online_for_chat(&target_user_id, &user_id).await {
            self.registry
                .send_to_chat(
                    &target_user_id,
                    &user_id,
                    Envelope::server(
                        "relay_message_request",
                        json!({"message": message, "public_key": public_key}),
                    ),
                )
                .await;
            debug!(%user_id, %target_user_id, "message relayed live");
        } else {
            self.storage.insert(&user_id, &target_user_id, &message).await?;
            debug!(%user_id, %target_user_id, "message spooled for offline recipient");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chat creation notice
    // ------------------------------------------------------------------

    async fn create_chat_request(&self, envelope: &Envelope) -> Result<()> {
        let user_id = envelope.user_id.as_deref().unwrap_or_default();
        let target_user_id = field(&envelope.content, "target_user_id", "create_chat_request")?;

        if self.registry.is_online(target_user_id).await {
            self.registry
                .send_to_main(
                    target_user_id,
                    Envelope::server("create_chat_request", json!({"target_user_id": user_id})),
                )
                .await;
        } else {
            self.registry.queue_chat_creation(target_user_id, user_id).await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Long-term public key directory
    // ------------------------------------------------------------------

    async fn get_long_term_public_key_request(
        &self,
        outbox: &Outbox,
        content: &serde_json::Value,
    ) -> Result<()> {
        let target_user_id = field(content, "target_user_id", "get_long_term_public_key_request")?;
        let public_key = self
            .storage
            .get_long_term_public_key(target_user_id)
            .await?
            .ok_or_else(|| Error::UserNotRegistered(target_user_id.to_string()))?;

        let _ = outbox.send(Envelope::server(
            "get_long_term_public_key_response",
            json!({"long_term_public_key": public_key}),
        ));
        Ok(())
    }

    async fn send_long_term_public_key_request(&self, envelope: &Envelope) -> Result<()> {
        let user_id = envelope.user_id.as_deref().unwrap_or_default();
        let public_key = field(
            &envelope.content,
            "long_term_public_key",
            "send_long_term_public_key_request",
        )?;
        self.storage.set_long_term_public_key(user_id, public_key).await?;
        Ok(())
    }

    /// Socket-close cleanup (§4.1 "Failure semantics" `__disconnect_user`).
    pub async fn disconnect(&self, state: &SocketState) {
        let Some(user_id) = state.user_id.as_deref() else {
            return;
        };
        match &state.role {
            SocketRole::Main { conn_id } => {
                self.registry.clear_main(user_id, *conn_id).await;
            }
            SocketRole::Chat { target_user_id, conn_id } => {
                self.registry.clear_chat(user_id, target_user_id, *conn_id).await;
            }
            SocketRole::Unbound => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::domain::{StoredMessage, User};

    use super::*;

    #[derive(Default)]
    struct FakeStorage {
        users: StdMutex<std::collections::HashMap<String, User>>,
        long_term_keys: StdMutex<std::collections::HashMap<String, String>>,
        spool: StdMutex<Vec<StoredMessage>>,
    }

    #[async_trait]
    impl UserRepository for FakeStorage {
        async fn create(&self, user_id: &str, email: &str, password_hash: &str) -> Result<()> {
            self.users.lock().unwrap().insert(
                user_id.to_string(),
                User::new(user_id, email, password_hash),
            );
            Ok(())
        }

        async fn find_by_credentials(
            &self,
            _email: &str,
            _password_hash: &str,
        ) -> Result<Option<User>> {
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
            self.spool.lock().unwrap().push(StoredMessage::pending(
                user_id,
                target_user_id,
                ciphertext,
            ));
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

    fn engine() -> SignalingEngine<FakeStorage> {
        SignalingEngine::new(Arc::new(FakeStorage::default()), Registry::new())
    }

    #[tokio::test]
    async fn unknown_request_type_closes_socket_only() {
        let engine = engine();
        let mut state = SocketState::default();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine
            .dispatch(&mut state, &tx, Envelope::from_user("bogus", "alice", json!({})))
            .await
            .unwrap_err();
        assert!(err.closes_socket_only());
    }

    #[tokio::test]
    async fn login_request_drains_pending_chat_creations() {
        let engine = engine();
        let mut state = SocketState::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.registry().queue_chat_creation("alice", "bob").await;

        engine
            .dispatch(
                &mut state,
                &tx,
                Envelope::from_user(
                    "login_request",
                    "alice",
                    json!({"long_term_public_key": "ltpk"}),
                ),
            )
            .await
            .unwrap();

        assert_eq!(state.user_id.as_deref(), Some("alice"));
        let response = rx.try_recv().unwrap();
        assert_eq!(response.kind, "created_chats");
        assert_eq!(response.content["created_chats"], json!(["bob"]));
    }

    #[tokio::test]
    async fn register_request_drains_offline_spool() {
        let engine = engine();
        engine
            .storage
            .insert("bob", "alice", "ciphertext-1")
            .await
            .unwrap();

        let mut state = SocketState::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine
            .dispatch(
                &mut state,
                &tx,
                Envelope::from_user(
                    "register_request",
                    "alice",
                    json!({"target_user_id": "bob", "public_key": "pk-alice"}),
                ),
            )
            .await
            .unwrap();

        let spooled = rx.try_recv().unwrap();
        assert_eq!(spooled.kind, "send_stored_messages");
        assert_eq!(spooled.content["message"], json!(["ciphertext-1"]));

        let status = rx.try_recv().unwrap();
        assert_eq!(
            status.content["register_response_type"],
            json!("target_user_offline")
        );
    }

    #[tokio::test]
    async fn connection_request_to_unregistered_user_errors() {
        let engine = engine();
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine
            .connection_request(
                &Envelope::from_user("connection_request", "alice", json!({"target_user_id": "bob"})),
                &tx,
            )
            .await
            .unwrap();

        let response = rx.try_recv().unwrap();
        assert_eq!(
            response.content["connection_response_type"],
            json!("user_not_registered_error")
        );
    }

    #[tokio::test]
    async fn relay_message_spools_when_recipient_offline() {
        let engine = engine();
        engine
            .relay_message_request(&Envelope::from_user(
                "relay_message_request",
                "alice",
                json!({"target_user": "bob", "message": "ct"}),
            ))
            .await
            .unwrap();

        let spooled = engine.storage.drain("alice", "bob").await.unwrap();
        assert_eq!(spooled.len(), 1);
        assert_eq!(spooled[0].ciphertext, "ct");
    }
}
