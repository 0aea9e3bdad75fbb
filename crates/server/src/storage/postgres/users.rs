//! Postgres user repository implementation.

use async_trait::async_trait;
use sqlx::Row;

use super::PostgresStorage;
use crate::domain::User;
use crate::storage::UserRepository;
use crate::Result;

#[async_trait]
impl UserRepository for PostgresStorage {
    async fn create(&self, user_id: &str, email: &str, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_credentials(&self, email: &str, password_hash: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT u.user_id, u.email, u.password, pk.public_key
            FROM users u
            LEFT JOIN public_keys pk ON pk.user_id = u.user_id
            WHERE u.email = $1 AND u.password = $2
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| User {
            user_id: row.get("user_id"),
            email: row.get("email"),
            password_hash: row.get("password"),
            long_term_public_key: row.get("public_key"),
            ..User::default()
        }))
    }

    async fn exists(&self, user_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn set_long_term_public_key(&self, user_id: &str, public_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO public_keys (user_id, public_key)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET public_key = EXCLUDED.public_key, "timestamp" = now()
            "#,
        )
        .bind(user_id)
        .bind(public_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_long_term_public_key(&self, user_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT public_key FROM public_keys WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get("public_key")))
    }
}
