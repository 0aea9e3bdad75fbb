//! # Signaling/relay rendezvous server
//!
//! Presence tracking, WebRTC offer/answer rendezvous, and store-and-forward
//! message relay for the end-to-end-encrypted peer-to-peer messenger.
//! The server never sees plaintext: it relays opaque ciphertext content
//! and shuffles public keys between peers.
//!
//! ## Architecture
//!
//! - **Domain** (`domain/`): Pure types with no I/O dependencies.
//! - **Core** (`core/`): Protocol-agnostic signaling logic and the
//!   in-memory presence registry.
//! - **Storage** (`storage/`): Durable persistence (users, public keys,
//!   spooled messages) behind repository traits.
//! - **Adapters** (`adapters/`): The websocket wire surface and an
//!   ambient HTTP health endpoint.
//! - **Config** (`config/`): Layered configuration.
//!
//! ## Design Principles
//!
//! 1. **Protocol-agnostic core**: the signaling engine doesn't know
//!    about websockets.
//! 2. **Trait-based storage**: swap the backing database without
//!    touching the engine.
//! 3. **No global state**: all state flows through the [`core::Registry`]
//!    and the storage traits, both passed explicitly.

pub mod domain;

pub mod core;

pub mod storage;

pub mod adapters;

pub mod config;

pub mod error;

pub use crate::error::Error;

/// Result type alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
