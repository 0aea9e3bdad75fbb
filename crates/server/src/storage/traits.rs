//! Storage traits — repository interfaces.
//!
//! These traits define the contract for all persistence the signaling
//! server needs. The registry depends on these traits, not on
//! `PostgresStorage` directly, so handler logic can be unit tested
//! against an in-memory fake.

use async_trait::async_trait;

use crate::domain::{StoredMessage, User};
use crate::Result;

/// Durable user records: `users` + `public_keys` tables (§6).
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Idempotent: a duplicate `user_id` is treated
    /// as success (§8 "server MUST tolerate duplicate register_request"
    /// extends naturally to `add_user_to_data_base`).
    async fn create(&self, user_id: &str, email: &str, password_hash: &str) -> Result<()>;

    /// Look up a user by email + password hash, for `get_user_info_from_data_base`.
    async fn find_by_credentials(&self, email: &str, password_hash: &str) -> Result<Option<User>>;

    /// Whether `user_id` has ever been registered (`check_user_existance_request`).
    async fn exists(&self, user_id: &str) -> Result<bool>;

    /// Upsert `user_id`'s long-term public key (`send_long_term_public_key_request`,
    /// and implicitly on `login_request`).
    async fn set_long_term_public_key(&self, user_id: &str, public_key: &str) -> Result<()>;

    /// Fetch `user_id`'s long-term public key (`get_long_term_public_key_request`).
    /// `None` means the user has never published one.
    async fn get_long_term_public_key(&self, user_id: &str) -> Result<Option<String>>;
}

/// Offline message spool: `messages` table (§6).
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Spool a ciphertext for an offline recipient.
    async fn insert(&self, user_id: &str, target_user_id: &str, ciphertext: &str) -> Result<()>;

    /// Atomically fetch and delete every row addressed `sender -> recipient`,
    /// oldest first (§4.1 "Offline spool semantics", §8 "Spool atomicity").
    async fn drain(&self, sender: &str, recipient: &str) -> Result<Vec<StoredMessage>>;
}
