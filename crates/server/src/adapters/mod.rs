//! # Protocol Adapters
//!
//! Thin layers that translate between wire protocols and the core
//! signaling engine.
//!
//! - `ws`: the single websocket endpoint every request in §4.1 flows
//!   through — main (presence/chat-creation) sockets and per-chat
//!   sockets alike (§4.1 "Per-connection model").
//! - `http`: the ambient health/readiness surface. The spec's own local
//!   HTTP control plane (§6) belongs to the *client*, not this server.

pub mod http;
pub mod ws;
