//! App shell (§4.5): login, the main websocket (presence + chat-creation
//! notifications), and the directory of open `ChatOrchestrator`s backing
//! the local HTTP control plane.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::connection::HANDSHAKE_TIMEOUT;
use crate::crypto::{hash_password_for_wire, KeyVault};
use crate::domain::{envelope::kind, Envelope};
use crate::orchestrator::ChatOrchestrator;
use crate::protocol::ws::{self, WsSender};
use crate::store::Store;
use crate::{Error, Result};

/// Outcome of `App::add_chat` (§8 Boundaries, scenario 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddChatOutcome {
    Created,
    InvalidUserId,
}

struct MainSession {
    sender: Mutex<WsSender>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Envelope>>>>,
    new_chats: Arc<Mutex<Vec<String>>>,
    reader_task: JoinHandle<()>,
}

impl MainSession {
    async fn open(server_url: &str, store: Arc<Store>) -> Result<Self> {
        let (sender, mut receiver) = ws::connect(server_url).await?;
        let pending = Arc::new(Mutex::new(HashMap::new()));
        let new_chats = Arc::new(Mutex::new(Vec::new()));

        let pending_for_task = Arc::clone(&pending);
        let new_chats_for_task = Arc::clone(&new_chats);
        let reader_task = tokio::spawn(async move {
            while let Some(result) = receiver.recv().await {
                let envelope = match result {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "main socket transport error");
                        break;
                    }
                };

                if let Some(tx) = pending_for_task.lock().await.remove(&envelope.kind) {
                    let _ = tx.send(envelope);
                    continue;
                }

                if envelope.kind == kind::CREATE_CHAT {
                    if let Some(target_user_id) = envelope.content["target_user_id"].as_str() {
                        if let Err(e) = store.add_chat(target_user_id).await {
                            warn!(error = %e, "failed to persist chat-creation notice");
                        }
                        new_chats_for_task.lock().await.push(target_user_id.to_string());
                    }
                }
            }
        });

        Ok(Self {
            sender: Mutex::new(sender),
            pending,
            new_chats,
            reader_task,
        })
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.sender.lock().await.send(&envelope).await
    }

    async fn await_response(&self, response_type: &str) -> Result<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(response_type.to_string(), tx);
        timeout(HANDSHAKE_TIMEOUT, rx)
            .await
            .map_err(|_| Error::ConnectionTimeout(response_type.to_string()))?
            .map_err(|_| Error::Transport(format!("{response_type} future cancelled")))
    }

    async fn close(self) {
        self.reader_task.abort();
        let _ = self.sender.lock().await.close().await;
    }
}

/// A single request/response round trip against the signaling server,
/// for the account-management requests (§4.1 `add_user_to_data_base`,
/// `get_user_info_from_data_base`) that precede any `Session` existing.
/// Unlike `MainSession` these are one-shot: the socket is opened, used
/// once, and closed rather than kept open for presence/chat-creation
/// pushes.
async fn account_request(server_url: &str, request: Envelope, response_kind: &str) -> Result<Envelope> {
    let (mut sender, mut receiver) = ws::connect(server_url).await?;
    sender.send(&request).await?;

    let response = timeout(HANDSHAKE_TIMEOUT, async {
        loop {
            match receiver.recv().await {
                Some(Ok(envelope)) if envelope.kind == response_kind => return Ok(envelope),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
                None => return Err(Error::Transport(format!("socket closed awaiting {response_kind}"))),
            }
        }
    })
    .await
    .map_err(|_| Error::ConnectionTimeout(response_kind.to_string()))??;

    let _ = sender.close().await;
    Ok(response)
}

struct Session {
    user_id: String,
    key_vault: KeyVault,
    main: MainSession,
    store: Arc<Store>,
    chats: Mutex<HashMap<String, Arc<ChatOrchestrator>>>,
}

pub struct App {
    config: ClientConfig,
    session: Mutex<Option<Session>>,
}

impl App {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// Create an account on the signaling server (§4.1
    /// `add_user_to_data_base`, §5 supplemented feature). The password
    /// never reaches the wire: only its SHA-256 digest does, independent
    /// of the Argon2id-derived key `KeyVault::unlock` computes locally to
    /// wrap the long-term identity.
    pub async fn register(&self, user_id: &str, email: &str, password: &str) -> Result<()> {
        let response = account_request(
            &self.config.server_url,
            Envelope::from_user(
                kind::ADD_USER,
                user_id.to_string(),
                json!({
                    "user_id": user_id,
                    "email": email,
                    "password": hash_password_for_wire(password),
                }),
            ),
            kind::ADD_USER_RESPONSE,
        )
        .await?;

        match response.content["status"].as_str() {
            Some("success") => Ok(()),
            _ => Err(Error::Rejected(
                response.content["message"].as_str().unwrap_or("account creation rejected").to_string(),
            )),
        }
    }

    /// Resolve `user_id` from an email/password pair (§4.1
    /// `get_user_info_from_data_base`), for a login UI that only has the
    /// user's email on hand. Same client-side hashing as [`App::register`].
    pub async fn resolve_user_id(&self, email: &str, password: &str) -> Result<String> {
        let response = account_request(
            &self.config.server_url,
            Envelope {
                kind: kind::GET_USER_INFO.to_string(),
                user_id: None,
                content: json!({
                    "email": email,
                    "password": hash_password_for_wire(password),
                }),
            },
            kind::GET_USER_INFO_RESPONSE,
        )
        .await?;

        match response.content["status"].as_str() {
            Some("success") => Ok(response.content["user_id"].as_str().unwrap_or_default().to_string()),
            _ => Err(Error::Rejected(
                response.content["message"].as_str().unwrap_or("invalid email or password").to_string(),
            )),
        }
    }

    /// Unlock the KeyVault, open the main websocket, send `login_request`,
    /// persist any `created_chats`, and open one `ChatOrchestrator` per
    /// known chat (§4.5).
    pub async fn login(&self, user_id: &str, password: &str) -> Result<()> {
        let keys_dir = self.config.keys_dir.join(user_id);
        let key_vault = KeyVault::unlock(password, &keys_dir)?;

        let database_url = format!("{}-{user_id}.db", self.config.database_url_client.trim_end_matches(".db"));
        let store = Arc::new(Store::connect(&database_url, key_vault.symmetric_key().to_owned()).await?);

        let main = MainSession::open(&self.config.server_url, Arc::clone(&store)).await?;
        main.send(Envelope::from_user(
            kind::LOGIN_REQUEST,
            user_id.to_string(),
            json!({"long_term_public_key": key_vault.long_term_key_pair().public_key_base64()}),
        ))
        .await?;

        let created = main.await_response(kind::CREATED_CHATS).await?;
        for target in created.content["created_chats"].as_array().cloned().unwrap_or_default() {
            if let Some(target) = target.as_str() {
                store.add_chat(target).await?;
            }
        }

        let known_chats = store.list_chats().await?;
        let mut chats = HashMap::new();
        for target_user_id in known_chats {
            let orchestrator = Arc::new(ChatOrchestrator::new(
                user_id.to_string(),
                target_user_id.clone(),
                key_vault.long_term_key_pair().clone(),
                self.config.server_url.clone(),
                self.config.stun_servers.clone(),
                Arc::clone(&store),
            ));
            if let Err(e) = orchestrator.open().await {
                warn!(target_user_id = %target_user_id, error = %e, "failed to open chat on login; will retry lazily");
            }
            chats.insert(target_user_id, orchestrator);
        }

        *self.session.lock().await = Some(Session {
            user_id: user_id.to_string(),
            key_vault,
            main,
            store,
            chats: Mutex::new(chats),
        });

        info!(%user_id, "login complete");
        Ok(())
    }

    pub async fn chats_loaded(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Enforce that `user_id` matches the logged-in session (§6: mismatch
    /// returns 403).
    pub async fn authorize(&self, user_id: &str) -> Result<()> {
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| Error::UserNotRegistered("no active session".to_string()))?;
        if session.user_id != user_id {
            return Err(Error::UserNotRegistered(format!("{user_id} is not the active session")));
        }
        Ok(())
    }

    pub async fn list_chats(&self, user_id: &str) -> Result<Vec<String>> {
        self.authorize(user_id).await?;
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| Error::UserNotRegistered("no active session".to_string()))?;
        session.store.list_chats().await
    }

    pub async fn new_chats(&self) -> Result<Vec<String>> {
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| Error::UserNotRegistered("no active session".to_string()))?;
        let mut queue = session.main.new_chats.lock().await;
        Ok(std::mem::take(&mut *queue))
    }

    /// `check_user_existance_request`-gated chat creation (§4.5, §8
    /// scenario 5): rejects self and non-existent targets.
    pub async fn add_chat(&self, user_id: &str, target_user_id: &str) -> Result<AddChatOutcome> {
        self.authorize(user_id).await?;
        if target_user_id == user_id {
            return Ok(AddChatOutcome::InvalidUserId);
        }

        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| Error::UserNotRegistered("no active session".to_string()))?;

        session
            .main
            .send(Envelope::from_user(
                kind::CHECK_USER_EXISTENCE,
                user_id.to_string(),
                json!({"target_user_id": target_user_id}),
            ))
            .await?;
        let response = session.main.await_response(kind::CHECK_USER_EXISTENCE).await?;
        if !response.content["user_existance"].as_bool().unwrap_or(false) {
            return Ok(AddChatOutcome::InvalidUserId);
        }

        session.store.add_chat(target_user_id).await?;

        let orchestrator = Arc::new(ChatOrchestrator::new(
            user_id.to_string(),
            target_user_id.to_string(),
            session.key_vault.long_term_key_pair().clone(),
            self.config.server_url.clone(),
            self.config.stun_servers.clone(),
            Arc::clone(&session.store),
        ));
        orchestrator.open().await?;
        session.chats.lock().await.insert(target_user_id.to_string(), orchestrator);

        session
            .main
            .send(Envelope::from_user(
                kind::CREATE_CHAT,
                user_id.to_string(),
                json!({"target_user_id": target_user_id}),
            ))
            .await?;

        Ok(AddChatOutcome::Created)
    }

    pub async fn get_messages(&self, user_id: &str, target_user_id: &str) -> Result<Vec<crate::domain::Message>> {
        self.authorize(user_id).await?;
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| Error::UserNotRegistered("no active session".to_string()))?;
        session.store.get_messages(user_id, target_user_id).await
    }

    pub async fn get_new_messages(
        &self,
        user_id: &str,
        target_user_id: &str,
        since_iso: &str,
    ) -> Result<Vec<crate::domain::Message>> {
        self.authorize(user_id).await?;
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| Error::UserNotRegistered("no active session".to_string()))?;
        session.store.get_messages_since(user_id, target_user_id, Some(since_iso)).await
    }

    pub async fn send_message(&self, user_id: &str, target_user_id: &str, content: &str) -> Result<()> {
        self.authorize(user_id).await?;
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| Error::UserNotRegistered("no active session".to_string()))?;
        let chats = session.chats.lock().await;
        let orchestrator = chats
            .get(target_user_id)
            .ok_or_else(|| Error::UserNotRegistered(target_user_id.to_string()))?;
        orchestrator.send(content).await
    }

    /// Fan out close to every open chat and the main session (§5).
    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            for (_, orchestrator) in session.chats.into_inner() {
                orchestrator.close().await;
            }
            session.main.close().await;
        }
    }
}
