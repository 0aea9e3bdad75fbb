//! Local encrypted store (§4.5, §6): chat list and message history, with
//! every text column symmetrically encrypted under the KeyVault's
//! password-derived key.
//!
//! `target_user_id`/`user_id` are encrypted per the specification, which
//! means they can't be used as SQL `WHERE` predicates or a SQL-enforced
//! unique key (AES-GCM is randomized — the same plaintext never encrypts
//! to the same ciphertext twice). Row counts here are a handful of chats
//! and a personal message history, not a web-scale table, so lookups
//! decrypt and filter in application code instead of in the query.
//! `timestamp` is left unencrypted since range queries over it
//! (`get_new_messages`) are part of the control-plane contract.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::crypto::aes_gcm::{Cipher, NONCE_SIZE};
use crate::domain::Message;
use crate::Result;

pub struct Store {
    pool: SqlitePool,
    symmetric_key: [u8; 32],
}

impl Store {
    pub async fn connect(database_url: &str, symmetric_key: [u8; 32]) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(connect_options).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                target_user_id TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                target_user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                is_outgoing INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, symmetric_key })
    }

    fn cipher(&self) -> Cipher {
        Cipher::new(&self.symmetric_key)
    }

    fn encrypt_field(&self, plaintext: &str) -> String {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
        let cipher = self.cipher();
        let (nonce, ciphertext) = cipher.encrypt(plaintext.as_bytes()).expect("AES-GCM encryption cannot fail here");
        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        BASE64.encode(sealed)
    }

    fn decrypt_field(&self, ciphertext: &str) -> Option<String> {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
        let raw = BASE64.decode(ciphertext).ok()?;
        if raw.len() < NONCE_SIZE {
            return None;
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        let plaintext = self.cipher().decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }

    /// Register a chat, unless one for this peer already exists.
    pub async fn add_chat(&self, target_user_id: &str) -> Result<()> {
        if self.list_chats().await?.iter().any(|t| t == target_user_id) {
            return Ok(());
        }
        sqlx::query("INSERT INTO chats (target_user_id) VALUES (?)")
            .bind(self.encrypt_field(target_user_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_chats(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT target_user_id FROM chats").fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| self.decrypt_field(row.get::<String, _>("target_user_id").as_str()))
            .collect())
    }

    pub async fn insert_message(&self, message: &Message, is_outgoing: bool) -> Result<()> {
        let serialized = serde_json::to_string(message)?;
        let timestamp = format!("{}T{}Z", message.sending_time.date, message.sending_time.time);

        sqlx::query(
            "INSERT INTO messages (user_id, target_user_id, message, is_outgoing, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(self.encrypt_field(&message.user_id))
        .bind(self.encrypt_field(&message.target_user_id))
        .bind(self.encrypt_field(&serialized))
        .bind(is_outgoing as i64)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every message between `user_id` and `target_user_id`, oldest first.
    pub async fn get_messages(&self, user_id: &str, target_user_id: &str) -> Result<Vec<Message>> {
        self.get_messages_since(user_id, target_user_id, None).await
    }

    pub async fn get_messages_since(
        &self,
        user_id: &str,
        target_user_id: &str,
        since: Option<&str>,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query("SELECT user_id, target_user_id, message, timestamp FROM messages ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::new();
        for row in rows {
            let row_user: String = row.get("user_id");
            let row_target: String = row.get("target_user_id");
            let row_message: String = row.get("message");
            let timestamp: String = row.get("timestamp");

            let Some(decrypted_user) = self.decrypt_field(&row_user) else { continue };
            let Some(decrypted_target) = self.decrypt_field(&row_target) else { continue };

            let belongs_to_chat = (decrypted_user == user_id && decrypted_target == target_user_id)
                || (decrypted_user == target_user_id && decrypted_target == user_id);
            if !belongs_to_chat {
                continue;
            }
            if let Some(since) = since {
                if timestamp.as_str() <= since {
                    continue;
                }
            }

            if let Some(plaintext) = self.decrypt_field(&row_message) {
                if let Ok(message) = serde_json::from_str::<Message>(&plaintext) {
                    out.push(message);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        Store::connect("sqlite::memory:", [7u8; 32]).await.unwrap()
    }

    #[tokio::test]
    async fn add_chat_is_idempotent() {
        let store = store().await;
        store.add_chat("bob").await.unwrap();
        store.add_chat("bob").await.unwrap();
        assert_eq!(store.list_chats().await.unwrap(), vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn messages_round_trip_encrypted_at_rest() {
        let store = store().await;
        let message = Message::new("hi", "alice", "bob");
        store.insert_message(&message, true).await.unwrap();

        let rows = sqlx::query("SELECT message FROM messages").fetch_all(&store.pool).await.unwrap();
        let raw: String = rows[0].get("message");
        assert!(!raw.contains("hi"));

        let messages = store.get_messages("alice", "bob").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
    }

    #[tokio::test]
    async fn get_messages_since_filters_out_older_rows() {
        let store = store().await;
        let mut first = Message::new("first", "alice", "bob");
        first.sending_time.date = "2025-01-01".to_string();
        first.sending_time.time = "00:00:00.000000".to_string();
        store.insert_message(&first, true).await.unwrap();

        let mut second = Message::new("second", "alice", "bob");
        second.sending_time.date = "2025-06-01".to_string();
        second.sending_time.time = "00:00:00.000000".to_string();
        store.insert_message(&second, true).await.unwrap();

        let recent = store
            .get_messages_since("alice", "bob", Some("2025-03-01T00:00:00.000000Z"))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "second");
    }
}
