//! PostgreSQL storage implementation.

pub mod messages;
pub mod migrations;
pub mod users;

use sqlx::PgPool;

use crate::Result;

/// Postgres-backed storage. Holds a connection pool; all repository
/// impls below operate on `&self.pool` directly (no per-call connection
/// borrowing, matching §5 "one connection per transaction").
pub struct PostgresStorage {
    pub(crate) pool: PgPool,
}

impl PostgresStorage {
    /// Connect and apply any pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, sql) in migrations::all() {
            let already_applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = $1")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?;

            if already_applied.is_some() {
                continue;
            }

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        Ok(())
    }
}
