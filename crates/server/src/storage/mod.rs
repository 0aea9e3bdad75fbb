//! # Storage Layer
//!
//! Database abstraction via repository traits.
//!
//! The registry and signaling handlers (`crate::core`) depend on these
//! traits, not on `postgres` directly, keeping the engine swappable and
//! unit-testable without a live database.
//!
//! ## Traits
//!
//! - `UserRepository`: registration, lookup, long-term key directory.
//! - `MessageRepository`: offline-spool insert/drain (§4.1, §8 "spool atomicity").

pub mod postgres;
pub mod traits;

pub use postgres::PostgresStorage;
pub use traits::{MessageRepository, UserRepository};
