//! In-memory session registry (§3 "User" invariants, §4.1).
//!
//! Durable identity — credentials and the long-term public key directory —
//! lives in `storage`. This registry holds only connection-lifetime state
//! that is rebuilt from nothing on every process start: which sockets are
//! open for which user, per-chat ephemeral public keys, pending-peer
//! bookkeeping, and queued chat-creation notices for offline users.
//!
//! Every mutation goes through a single `tokio::sync::Mutex` — there is
//! no per-field locking to reason about.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::domain::Envelope;

/// Outbound sender for one open websocket. Cloning is cheap; sending after
/// the receiving task has exited is a silent no-op (the channel is simply
/// dropped), which is fine — the registry entry is cleared on socket close.
pub type Outbox = mpsc::UnboundedSender<Envelope>;

/// Opaque handle identifying one specific socket registration.
///
/// Two connections for the same `(user_id, chat)` slot can race (a client
/// reconnecting before its old socket's close has been processed); `ConnId`
/// lets the closing task confirm it still owns the slot before clearing it,
/// so a stale close never clobbers a fresher registration.
pub type ConnId = u64;

struct Slot {
    id: ConnId,
    tx: Outbox,
}

#[derive(Default)]
struct RegisteredUser {
    main: Option<Slot>,
    chats: HashMap<String, Slot>,
    chat_public_keys: HashMap<String, String>,
    pending_peers: HashSet<String>,
    pended_peers: HashSet<String>,
    pending_chat_creations: Vec<String>,
}

/// The server's presence/pending-peer table (§3).
#[derive(Clone)]
pub struct Registry {
    users: Arc<Mutex<HashMap<String, RegisteredUser>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn alloc_id(&self) -> ConnId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `user_id`'s main websocket (`login_request`). Returns the
    /// new slot's id and the chat-creation notices queued while they were
    /// offline, draining `pending_chat_creations` in the same step (§4.1
    /// `login_request` → `created_chats`).
    pub async fn register_main(&self, user_id: &str, tx: Outbox) -> (ConnId, Vec<String>) {
        let id = self.alloc_id();
        let mut users = self.users.lock().await;
        let entry = users.entry(user_id.to_string()).or_default();
        entry.main = Some(Slot { id, tx });
        let drained = std::mem::take(&mut entry.pending_chat_creations);
        (id, drained)
    }

    /// Register `user_id`'s per-chat socket for `target_user_id`
    /// (`register_request`), idempotently overwriting any prior slot for
    /// the same chat (§8 "server MUST tolerate duplicate register_request").
    pub async fn register_chat(
        &self,
        user_id: &str,
        target_user_id: &str,
        tx: Outbox,
        public_key: String,
    ) -> ConnId {
        let id = self.alloc_id();
        let mut users = self.users.lock().await;
        let entry = users.entry(user_id.to_string()).or_default();
        entry.chats.insert(target_user_id.to_string(), Slot { id, tx });
        entry.chat_public_keys.insert(target_user_id.to_string(), public_key);
        id
    }

    /// Clear `user_id`'s main socket iff it is still `conn_id` (no-op on a
    /// stale close racing a fresher `login_request`).
    pub async fn clear_main(&self, user_id: &str, conn_id: ConnId) {
        let mut users = self.users.lock().await;
        if let Some(u) = users.get_mut(user_id) {
            if u.main.as_ref().is_some_and(|s| s.id == conn_id) {
                u.main = None;
            }
        }
    }

    /// Clear `user_id`'s chat socket for `target_user_id` iff it is still
    /// `conn_id`, and resolve the pending-peer symmetry for that pair
    /// (§4.1 "Failure semantics", §8 "Pending-peer symmetry").
    pub async fn clear_chat(&self, user_id: &str, target_user_id: &str, conn_id: ConnId) {
        let mut users = self.users.lock().await;
        let still_owns = users
            .get(user_id)
            .and_then(|u| u.chats.get(target_user_id))
            .is_some_and(|s| s.id == conn_id);
        if !still_owns {
            return;
        }
        if let Some(u) = users.get_mut(user_id) {
            u.chats.remove(target_user_id);
            u.pended_peers.remove(target_user_id);
        }
        if let Some(t) = users.get_mut(target_user_id) {
            t.pending_peers.remove(user_id);
        }
    }

    /// Whether `user_id` has a chat socket open for `target_user_id`.
    pub async fn is_online_for_chat(&self, user_id: &str, target_user_id: &str) -> bool {
        self.users
            .lock()
            .await
            .get(user_id)
            .is_some_and(|u| u.chats.contains_key(target_user_id))
    }

    /// Whether `user_id`'s main (presence/chat-creation) socket is open.
    pub async fn is_online(&self, user_id: &str) -> bool {
        self.users
            .lock()
            .await
            .get(user_id)
            .is_some_and(|u| u.main.is_some())
    }

    /// `target_user_id`'s ephemeral public key for its chat with `user_id`,
    /// as most recently advertised via `register_request`.
    pub async fn chat_public_key(&self, target_user_id: &str, user_id: &str) -> Option<String> {
        self.users
            .lock()
            .await
            .get(target_user_id)
            .and_then(|u| u.chat_public_keys.get(user_id).cloned())
    }

    /// Send an envelope over `user_id`'s chat socket with `peer_id`, if open.
    pub async fn send_to_chat(&self, user_id: &str, peer_id: &str, envelope: Envelope) -> bool {
        let users = self.users.lock().await;
        match users.get(user_id).and_then(|u| u.chats.get(peer_id)) {
            Some(slot) => slot.tx.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Send an envelope over `user_id`'s main socket, if open.
    pub async fn send_to_main(&self, user_id: &str, envelope: Envelope) -> bool {
        let users = self.users.lock().await;
        match users.get(user_id).and_then(|u| u.main.as_ref()) {
            Some(slot) => slot.tx.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Record that `user_id` is waiting for `target_user_id`
    /// (`pended_peers`), and symmetrically that `target_user_id`'s entry
    /// lists `user_id` as waiting to reach it (`pending_peers`).
    pub async fn mark_pending(&self, user_id: &str, target_user_id: &str) {
        let mut users = self.users.lock().await;
        users
            .entry(user_id.to_string())
            .or_default()
            .pended_peers
            .insert(target_user_id.to_string());
        users
            .entry(target_user_id.to_string())
            .or_default()
            .pending_peers
            .insert(user_id.to_string());
    }

    /// Whether `target_user_id` is in `user_id`'s own `pending_peers` set
    /// (i.e. `target_user_id` is waiting to reach `user_id` and was
    /// recorded as pending while `user_id` was offline).
    pub async fn is_pending_peer(&self, user_id: &str, target_user_id: &str) -> bool {
        self.users
            .lock()
            .await
            .get(user_id)
            .is_some_and(|u| u.pending_peers.contains(target_user_id))
    }

    /// Resolve a pending-peer pair once the waited-for side reconnects:
    /// clears `target_user_id` from `user_id`'s `pending_peers` and
    /// `user_id` from `target_user_id`'s `pended_peers`.
    pub async fn resolve_pending(&self, user_id: &str, target_user_id: &str) {
        let mut users = self.users.lock().await;
        if let Some(u) = users.get_mut(user_id) {
            u.pending_peers.remove(target_user_id);
        }
        if let Some(t) = users.get_mut(target_user_id) {
            t.pended_peers.remove(user_id);
        }
    }

    /// Append `user_id` to `target_user_id`'s queued chat creations
    /// (`create_chat_request` while offline).
    pub async fn queue_chat_creation(&self, target_user_id: &str, user_id: &str) {
        let mut users = self.users.lock().await;
        users
            .entry(target_user_id.to_string())
            .or_default()
            .pending_chat_creations
            .push(user_id.to_string());
    }
}

/// Per-socket registration state, owned by the websocket adapter task and
/// threaded through each `dispatch` call so the engine can both act on it
/// (bind on `login_request`/`register_request`) and so the adapter knows
/// what to clear on close.
#[derive(Debug, Clone, Default)]
pub struct SocketState {
    pub user_id: Option<String>,
    pub role: SocketRole,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SocketRole {
    #[default]
    Unbound,
    Main {
        conn_id: ConnId,
    },
    Chat {
        target_user_id: String,
        conn_id: ConnId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope::server("test", serde_json::json!({}))
    }

    #[tokio::test]
    async fn register_main_drains_pending_chat_creations() {
        let registry = Registry::new();
        registry.queue_chat_creation("bob", "alice").await;
        registry.queue_chat_creation("bob", "carol").await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let (_id, drained) = registry.register_main("bob", tx).await;
        assert_eq!(drained, vec!["alice".to_string(), "carol".to_string()]);

        // Second login drains nothing further.
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (_id2, drained2) = registry.register_main("bob", tx2).await;
        assert!(drained2.is_empty());
    }

    #[tokio::test]
    async fn stale_close_does_not_clobber_fresh_registration() {
        let registry = Registry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (id1, _) = registry.register_main("alice", tx1).await;

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (_id2, _) = registry.register_main("alice", tx2).await;

        // The old connection's close races in after the reconnect.
        registry.clear_main("alice", id1).await;
        assert!(registry.is_online("alice").await);
    }

    #[tokio::test]
    async fn pending_peer_symmetry_holds() {
        let registry = Registry::new();
        registry.mark_pending("alice", "bob").await;
        assert!(registry.is_pending_peer("bob", "alice").await);

        registry.resolve_pending("bob", "alice").await;
        assert!(!registry.is_pending_peer("bob", "alice").await);
    }

    #[tokio::test]
    async fn send_to_chat_requires_open_socket() {
        let registry = Registry::new();
        assert!(!registry.send_to_chat("alice", "bob", envelope()).await);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .register_chat("alice", "bob", tx, "pk".into())
            .await;
        assert!(registry.send_to_chat("alice", "bob", envelope()).await);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn clear_chat_clears_pending_peer_symmetry() {
        let registry = Registry::new();
        registry.mark_pending("alice", "bob").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register_chat("bob", "alice", tx, "pk".into()).await;

        registry.clear_chat("bob", "alice", id).await;
        assert!(!registry.is_pending_peer("bob", "alice").await);
    }
}
