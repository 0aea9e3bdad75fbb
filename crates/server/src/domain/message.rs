//! Offline-spool entry — the server-side "StoredMessage" (§3).
//!
//! Ciphertexts are opaque to the server: it stores and forwards exactly
//! what `relay_message_request` handed it, under the recipient's
//! long-term public key. No plaintext, no message type, ever reaches
//! this layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A spooled message awaiting delivery to an offline recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub user_id: String,
    pub target_user_id: String,
    pub ciphertext: String,
    pub inserted_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Construct a row prior to insertion (no id yet assigned).
    pub fn pending(user_id: impl Into<String>, target_user_id: impl Into<String>, ciphertext: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            target_user_id: target_user_id.into(),
            ciphertext: ciphertext.into(),
            inserted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_message_has_no_id() {
        let m = StoredMessage::pending("alice", "bob", "ct");
        assert_eq!(m.id, 0);
        assert_eq!(m.user_id, "alice");
        assert_eq!(m.target_user_id, "bob");
    }
}
