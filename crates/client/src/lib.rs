//! # Tether client
//!
//! Login, per-peer end-to-end-encrypted chat sessions over a WebSocket
//! signaling server and a WebRTC data channel, and a local encrypted
//! message store — exposed to a local UI through an HTTP control plane.
//! The server never sees plaintext; this crate is where messages are
//! encrypted and decrypted.
//!
//! ## Architecture
//!
//! - **Domain** (`domain/`): Pure wire types — `Envelope`, `Message`.
//! - **Crypto** (`crypto/`): Key exchange, AEAD, the KeyVault identity
//!   store.
//! - **Protocol** (`protocol/`): The websocket transport to the signaling
//!   server.
//! - **Connection** (`connection`): Per-chat signaling + WebRTC state
//!   machine (§4.2).
//! - **Orchestrator** (`orchestrator`): Per-peer encryption/decryption and
//!   the choice of envelope (ephemeral vs. long-term key) (§4.3).
//! - **Store** (`store/`): Local encrypted SQLite chat history.
//! - **App** (`app`): Login, chat directory, and the facade the control
//!   plane calls into (§4.5).
//! - **Control plane** (`control_plane/`): The local HTTP API surface
//!   (§6).
//! - **Config** (`config/`): Layered configuration.

pub mod app;

pub mod config;

pub mod connection;

pub mod control_plane;

pub mod crypto;

pub mod domain;

pub mod error;

pub mod orchestrator;

pub mod protocol;

pub mod store;

pub use crate::error::Error;

/// Result type alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
