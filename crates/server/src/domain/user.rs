//! User domain types — the server-side registry record (§3 "User").
//!
//! Unlike a conventional account system the server never assigns
//! `user_id` itself: clients assert it at `add_user_to_data_base` time
//! and it is opaque from then on. Presence, pending-peer bookkeeping
//! and per-chat ephemeral key caching all live on [`User`]; the
//! registry (`crate::core::registry`) is the only thing that mutates
//! it, under a single lock per user.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::ValidationError;

/// Opaque, client-asserted user identifier.
///
/// The wire protocol treats `user_id` as a bare string (see §6); this
/// newtype exists only to stop us from confusing it with `target_user_id`
/// or email at the type level; it carries no validation beyond non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a raw string as a `UserId`, rejecting empty ids.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A registered user, as tracked by the in-memory registry (§3).
///
/// The `users`/`public_keys` tables (§6) hold the durable subset
/// (`user_id`, `email`, `password_hash`, `long_term_public_key`);
/// everything else here — sockets, pending sets, chat key cache — is
/// connection-lifetime state that the registry rebuilds from nothing
/// on every process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub password_hash: String,
    pub long_term_public_key: Option<String>,

    /// Present iff this user has an open "main" WebSocket (login_request
    /// socket used for presence/chat-creation pushes).
    #[serde(skip)]
    pub online: bool,

    /// target_user_id -> per-chat ephemeral public key this user most
    /// recently advertised for that chat.
    #[serde(skip)]
    pub chat_public_keys: HashMap<String, String>,

    /// Peers waiting to reach this user while they were offline.
    #[serde(skip)]
    pub pending_peers: HashSet<String>,

    /// Peers this user is waiting to reach (symmetric counterpart of
    /// `pending_peers` on the other side, §3 invariant).
    #[serde(skip)]
    pub pended_peers: HashSet<String>,

    /// Peers who created a chat with this user while they were offline;
    /// drained into `created_chats` on next `login_request`.
    #[serde(skip)]
    pub pending_chat_creations: Vec<String>,
}

impl User {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            long_term_public_key: None,
            online: false,
            chat_public_keys: HashMap::new(),
            pending_peers: HashSet::new(),
            pended_peers: HashSet::new(),
            pending_chat_creations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
    }

    #[test]
    fn user_id_round_trips_through_display() {
        let id = UserId::new("alice").unwrap();
        assert_eq!(id.to_string(), "alice");
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn new_user_starts_offline_with_empty_sets() {
        let u = User::new("alice", "alice@example.com", "hash");
        assert!(!u.online);
        assert!(u.pending_peers.is_empty());
        assert!(u.pended_peers.is_empty());
        assert!(u.long_term_public_key.is_none());
    }
}
