//! # Error Types
//!
//! Unified error handling for the rendezvous/relay server.
//!
//! ## Error Categories
//!
//! - **Protocol errors**: malformed or unexpected wire requests (§7)
//! - **Directory errors**: unknown target user
//! - **Storage errors**: database failures
//! - **System errors**: configuration/transport failures
//!
//! `IncorrectRequestType` and `SchemaViolation` are bugs or adversarial
//! input: the socket that produced them is closed and no other state is
//! touched. `UserNotRegistered` is returned to the caller as a response,
//! never a hard disconnect.

use thiserror::Error;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum Error {
    /// A request carried an unknown or unexpected `type`.
    #[error("incorrect request type: {0}")]
    IncorrectRequestType(String),

    /// A request's `content` was missing a required field or had the wrong shape.
    #[error("schema violation in {request_type}: {reason}")]
    SchemaViolation {
        request_type: String,
        reason: String,
    },

    /// `target_user_id` has no long-term public key on file.
    #[error("user not registered: {0}")]
    UserNotRegistered(String),

    /// Storage/database failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Configuration failure.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// WebSocket transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Listener bind or other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error should close only the offending socket (§7),
    /// as opposed to being reported back to the caller as a response.
    pub fn closes_socket_only(&self) -> bool {
        matches!(
            self,
            Error::IncorrectRequestType(_) | Error::SchemaViolation { .. }
        )
    }
}

/// Result type alias using the server's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incorrect_request_type_closes_socket_only() {
        assert!(Error::IncorrectRequestType("bogus".into()).closes_socket_only());
    }

    #[test]
    fn user_not_registered_does_not_close_socket() {
        assert!(!Error::UserNotRegistered("mallory".into()).closes_socket_only());
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            Error::IncorrectRequestType("foo".into()).to_string(),
            "incorrect request type: foo"
        );
        assert_eq!(
            Error::UserNotRegistered("bob".into()).to_string(),
            "user not registered: bob"
        );
    }
}
