//! # Core Engine
//!
//! Protocol-agnostic signaling logic for the rendezvous/relay server
//! (§4.1). Everything here is reachable only through [`SignalingEngine`];
//! the websocket adapter (`crate::adapters::ws`) is a thin translation
//! layer that parses frames into [`crate::domain::Envelope`]s and calls
//! `dispatch`.
//!
//! ## Components
//!
//! - `registry`: in-memory presence/pending-peer table (§3).
//! - `signaling`: the request catalog (§4.1's table), one handler per
//!   request `type`.

pub mod registry;
pub mod signaling;

pub use registry::{ConnId, Registry, SocketRole, SocketState};
pub use signaling::SignalingEngine;
