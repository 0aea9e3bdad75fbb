//! # Error Types
//!
//! Unified error handling for the client, covering §7's wire-level
//! taxonomy (`IncorrectRequestType`, `UserNotRegistered`,
//! `ConnectionTimeout`, `DecryptionFailure`, `Transport`,
//! `SchemaViolation`) plus storage, crypto, and configuration failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An incoming frame carried an unknown or unexpected `type`.
    #[error("incorrect request type: {0}")]
    IncorrectRequestType(String),

    /// `target_user_id` has no long-term public key on file on the server.
    #[error("user not registered: {0}")]
    UserNotRegistered(String),

    /// The handshake did not reach data-channel `open` within 10 s.
    #[error("connection timed out waiting for {0}")]
    ConnectionTimeout(String),

    /// Authentication tag mismatch or corrupt ciphertext. MUST NOT crash
    /// the chat — the caller drops the message and logs.
    #[error("failed to decrypt message from {0}")]
    DecryptionFailure(String),

    /// WebSocket closed or another I/O-level transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A request's `content` was missing a required field or had the wrong shape.
    #[error("schema violation in {request_type}: {reason}")]
    SchemaViolation { request_type: String, reason: String },

    /// KeyVault derivation/wrap/unwrap failure.
    #[error(transparent)]
    KeyVault(#[from] crate::crypto::KeyVaultError),

    /// `add_user_to_data_base`/`get_user_info_from_data_base` returned
    /// `status: error` (duplicate account, or bad email/password pair).
    #[error("account request rejected: {0}")]
    Rejected(String),

    /// Local SQLite store failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Configuration failure.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// WebSocket handshake/transport failure against the signaling server.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Listener bind or other I/O failure (control plane, key files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a bug/adversarial-input class that
    /// terminates only the offending socket (§7), as opposed to being
    /// surfaced to the UI or handled with a fallback.
    pub fn closes_socket_only(&self) -> bool {
        matches!(self, Error::IncorrectRequestType(_) | Error::SchemaViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
