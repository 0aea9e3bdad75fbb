//! `ChatOrchestrator`: one per peer (§4.3). Owns an ephemeral key pair, a
//! `Connection`, and the send/receive loop that picks an encryption
//! envelope per message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info_span, warn, Instrument};
use x25519_dalek::PublicKey;

use crate::connection::{Connection, EnvelopeKind, Inbound, Presence};
use crate::crypto::key_exchange::parse_public_key;
use crate::crypto::{sealed_box, KeyPair};
use crate::domain::Message;
use crate::store::Store;
use crate::{Error, Result};

pub struct ChatOrchestrator {
    user_id: String,
    target_user_id: String,
    ephemeral: KeyPair,
    long_term: KeyPair,
    connection: Arc<Connection>,
    peer_long_term_public_key: Mutex<Option<PublicKey>>,
    peer_ephemeral_public_key: Mutex<Option<PublicKey>>,
    store: Arc<Store>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Inbound>>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ChatOrchestrator {
    pub fn new(
        user_id: impl Into<String>,
        target_user_id: impl Into<String>,
        long_term: KeyPair,
        server_url: impl Into<String>,
        stun_servers: Vec<String>,
        store: Arc<Store>,
    ) -> Self {
        let user_id = user_id.into();
        let target_user_id = target_user_id.into();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let connection = Arc::new(Connection::new(
            user_id.clone(),
            target_user_id.clone(),
            server_url,
            stun_servers,
            inbound_tx,
        ));

        Self {
            user_id,
            target_user_id,
            ephemeral: KeyPair::generate(),
            long_term,
            connection,
            peer_long_term_public_key: Mutex::new(None),
            peer_ephemeral_public_key: Mutex::new(None),
            store,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            receive_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn target_user_id(&self) -> &str {
        &self.target_user_id
    }

    /// Cache the peer's long-term public key and start the receive loop
    /// (§4.3 `open`). Takes `self: &Arc<Self>` so the spawned loop can
    /// hold its own strong reference instead of borrowing.
    pub async fn open(self: &Arc<Self>) -> Result<()> {
        let peer_long_term = self.connection.get_long_term_public_key().await?;
        let peer_long_term = parse_public_key(&peer_long_term).map_err(|e| Error::SchemaViolation {
            request_type: "get_long_term_public_key_response".to_string(),
            reason: e.to_string(),
        })?;
        *self.peer_long_term_public_key.lock().await = Some(peer_long_term);

        let mut inbound_rx = self.inbound_rx.lock().await.take().expect("open() called more than once");
        let this = Arc::clone(self);
        let task = tokio::spawn(
            async move {
                while let Some(item) = inbound_rx.recv().await {
                    this.handle_inbound(item).await;
                }
            }
            .instrument(info_span!("chat_orchestrator", user_id = %self.user_id, target_user_id = %self.target_user_id)),
        );
        *self.receive_task.lock().await = Some(task);
        Ok(())
    }

    async fn handle_inbound(&self, item: Inbound) {
        if let Some(hint) = &item.public_key_hint {
            if let Ok(parsed) = parse_public_key(hint) {
                *self.peer_ephemeral_public_key.lock().await = Some(parsed);
            }
        }

        let opened = match item.envelope_kind {
            EnvelopeKind::LongTermPublicKey => {
                let Some(peer) = *self.peer_long_term_public_key.lock().await else {
                    warn!(target_user_id = %self.target_user_id, "dropping spooled message: peer long-term key not cached");
                    return;
                };
                sealed_box::open(&self.long_term, &peer, &item.ciphertext)
            }
            EnvelopeKind::PublicKey | EnvelopeKind::None => {
                let Some(peer) = *self.peer_ephemeral_public_key.lock().await else {
                    warn!(target_user_id = %self.target_user_id, "dropping message: no peer ephemeral key known yet");
                    return;
                };
                sealed_box::open(&self.ephemeral, &peer, &item.ciphertext)
            }
        };

        let plaintext = match opened {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(target_user_id = %self.target_user_id, error = %e, "dropping undecryptable message");
                return;
            }
        };

        let message: Message = match serde_json::from_slice(&plaintext) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "dropping inbound message with malformed plaintext");
                return;
            }
        };

        if let Err(e) = self.store.insert_message(&message, false).await {
            warn!(error = %e, "failed to persist inbound message");
        }
    }

    /// Encrypt and send one outgoing message, picking the envelope per
    /// §4.3's decision (the data-channel path is reserved — §9 Open
    /// Questions — so every send currently relays through the server).
    pub async fn send(&self, content: &str) -> Result<()> {
        let my_ephemeral_public = self.ephemeral.public_key_base64();
        let peer_ephemeral = self.connection.connect(&my_ephemeral_public).await?;
        if let Some(hint) = &peer_ephemeral {
            if let Ok(parsed) = parse_public_key(hint) {
                *self.peer_ephemeral_public_key.lock().await = Some(parsed);
            }
        }

        let message = Message::new(content, self.user_id.clone(), self.target_user_id.clone());
        let plaintext = serde_json::to_vec(&message)?;

        // A sticky handshake failure (§3 Connection invariant, §7
        // `ConnectionTimeout`, §8 scenario 4) forces the long-term
        // envelope on the next send even though `target_online` never
        // actually observed the peer going offline.
        let target_online = self.connection.target_online().await;
        let sealed = if target_online == Presence::Offline || self.connection.p2p_failed() {
            let peer_long_term = self
                .peer_long_term_public_key
                .lock()
                .await
                .ok_or_else(|| Error::UserNotRegistered(self.target_user_id.clone()))?;
            sealed_box::seal(&self.long_term, &peer_long_term, &plaintext)?
        } else {
            let peer_ephemeral = self
                .peer_ephemeral_public_key
                .lock()
                .await
                .ok_or_else(|| Error::ConnectionTimeout(format!("no ephemeral key for {}", self.target_user_id)))?;
            sealed_box::seal(&self.ephemeral, &peer_ephemeral, &plaintext)?
        };

        self.connection.relay_message(&sealed, Some(&my_ephemeral_public)).await?;
        self.store.insert_message(&message, true).await?;
        Ok(())
    }

    /// Cancel the receive loop and disconnect the underlying `Connection`
    /// (§4.3 `close`, §5 cancellation).
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.receive_task.lock().await.take() {
            task.abort();
        }
        self.connection.disconnect().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
