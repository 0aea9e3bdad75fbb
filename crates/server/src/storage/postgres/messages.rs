//! Postgres offline-message spool repository implementation.

use async_trait::async_trait;
use sqlx::Row;

use super::PostgresStorage;
use crate::domain::StoredMessage;
use crate::storage::MessageRepository;
use crate::Result;

#[async_trait]
impl MessageRepository for PostgresStorage {
    async fn insert(&self, user_id: &str, target_user_id: &str, ciphertext: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (user_id, target_user_id, message)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(target_user_id)
        .bind(ciphertext)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn drain(&self, sender: &str, recipient: &str) -> Result<Vec<StoredMessage>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, target_user_id, message, inserted_at
            FROM messages
            WHERE user_id = $1 AND target_user_id = $2
            ORDER BY inserted_at ASC
            FOR UPDATE
            "#,
        )
        .bind(sender)
        .bind(recipient)
        .fetch_all(&mut *tx)
        .await?;

        let messages: Vec<StoredMessage> = rows
            .iter()
            .map(|row| StoredMessage {
                id: row.get("id"),
                user_id: row.get("user_id"),
                target_user_id: row.get("target_user_id"),
                ciphertext: row.get("message"),
                inserted_at: row.get("inserted_at"),
            })
            .collect();

        sqlx::query("DELETE FROM messages WHERE user_id = $1 AND target_user_id = $2")
            .bind(sender)
            .bind(recipient)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(messages)
    }
}
