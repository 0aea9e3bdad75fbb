//! Wire envelope — `{type, user_id, content}` (§6).
//!
//! Every frame on every websocket, in either direction, is exactly one
//! JSON object of this shape. `content`'s schema is fixed per `type`
//! (§4.1's request catalog); since the catalog is wide and each shape is
//! small, handlers work directly against the `serde_json::Value` rather
//! than a per-type struct hierarchy, the way the original protocol's
//! `Request` class does.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A signaling request or response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    /// Build a frame asserting `user_id` as sender (client → server).
    pub fn from_user(kind: impl Into<String>, user_id: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            user_id: Some(user_id.into()),
            content,
        }
    }

    /// Build a server-originated frame (§3 "null for server-originated").
    pub fn server(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            user_id: None,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_json() {
        let env = Envelope::from_user("relay_message_request", "alice", json!({"message": "ct"}));
        let text = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.kind, "relay_message_request");
        assert_eq!(back.user_id.as_deref(), Some("alice"));
        assert_eq!(back.content["message"], "ct");
    }

    #[test]
    fn server_originated_has_null_user_id() {
        let env = Envelope::server("share_offer_request", json!({"user_id": "alice"}));
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains("\"user_id\":null"));
    }

    #[test]
    fn missing_content_defaults_to_null() {
        let env: Envelope = serde_json::from_str(r#"{"type":"x","user_id":"a"}"#).unwrap();
        assert!(env.content.is_null());
    }
}
