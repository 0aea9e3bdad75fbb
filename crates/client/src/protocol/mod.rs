//! Wire protocol adapters. The client has exactly one remote transport —
//! the websocket to the signaling server — plus the local HTTP control
//! plane exposed in `crate::control_plane`.

pub mod ws;
