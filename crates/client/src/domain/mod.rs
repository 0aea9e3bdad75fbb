//! Pure wire/data types shared by every other layer: the signaling
//! envelope, the request-kind catalog, and the plaintext chat message.

pub mod envelope;
pub mod message;

pub use envelope::Envelope;
pub use message::{Message, TimeObj};
