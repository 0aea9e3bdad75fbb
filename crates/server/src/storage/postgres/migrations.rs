//! Database migrations for Postgres.
//!
//! Migrations are applied in order and tracked in the `_migrations`
//! table so each one runs at most once (see `PostgresStorage::migrate`).

/// Get all migrations in order: (name, sql).
pub fn all() -> Vec<(&'static str, &'static str)> {
    vec![("001_initial_schema", MIGRATION_001)]
}

/// Initial schema: users, long-term public key directory, offline spool
/// (§6 "Server's relational store").
const MIGRATION_001: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS public_keys (
    user_id TEXT PRIMARY KEY NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    public_key TEXT NOT NULL,
    "timestamp" TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS messages (
    id BIGSERIAL PRIMARY KEY,
    user_id TEXT NOT NULL,
    target_user_id TEXT NOT NULL,
    message TEXT NOT NULL,
    inserted_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages (user_id, target_user_id, inserted_at);
"#;
