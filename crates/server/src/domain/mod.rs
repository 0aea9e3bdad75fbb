//! # Domain Types
//!
//! Pure Rust types that define the core vocabulary of the rendezvous
//! server. These types have no I/O dependencies and can be used anywhere.
//!
//! ## Modules
//!
//! - `user`: the server-side per-user registry record (§3 "User").
//! - `message`: the offline-spool entry (§3 "StoredMessage").
//! - `envelope`: the wire frame shape shared by every request/response (§6).

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod envelope;
pub mod message;
pub mod user;

pub use envelope::Envelope;
pub use message::StoredMessage;
pub use user::{User, UserId};

/// Validation error for domain types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    /// Value is empty when it shouldn't be.
    Empty,
    /// Value has invalid format.
    InvalidFormat { reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "value cannot be empty"),
            Self::InvalidFormat { reason } => write!(f, "invalid format: {reason}"),
        }
    }
}

impl std::error::Error for ValidationError {}
