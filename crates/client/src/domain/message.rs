//! The plaintext chat message and its canonical wire form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace UUID for deriving a message's `unique_id` (see
/// [`Message::unique_id`]). Fixed by the wire format, not configurable.
const MESSAGE_NAMESPACE_UUID: Uuid = Uuid::from_bytes([
    0x1b, 0xc4, 0x3a, 0x13, 0x70, 0xf6, 0x49, 0xc3, 0xbe, 0xa7, 0x26, 0xf4, 0xfc, 0xc5, 0xb6, 0xc8,
]);

/// `{"date": "YYYY-MM-DD", "time": "HH:MM:SS.ffffff"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeObj {
    pub date: String,
    pub time: String,
}

impl TimeObj {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            date: at.format("%Y-%m-%d").to_string(),
            time: at.format("%H:%M:%S%.6f").to_string(),
        }
    }
}

/// A plaintext chat message, canonically serialized with `type: "message"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub sending_time: TimeObj,
    pub user_id: String,
    pub target_user_id: String,
}

impl Message {
    pub fn new(content: impl Into<String>, user_id: impl Into<String>, target_user_id: impl Into<String>) -> Self {
        Self {
            kind: "message".to_string(),
            content: content.into(),
            sending_time: TimeObj::now(),
            user_id: user_id.into(),
            target_user_id: target_user_id.into(),
        }
    }

    /// `v5(MESSAGE_NAMESPACE_UUID, content|date\n|time|user_id|target_user_id)`.
    ///
    /// The literal newline after `date` is part of the wire format, not a
    /// formatting accident — preserved for compatibility.
    pub fn unique_id(&self) -> Uuid {
        let composed = format!(
            "{}|{}\n|{}|{}|{}",
            self.content, self.sending_time.date, self.sending_time.time, self.user_id, self.target_user_id
        );
        Uuid::new_v5(&MESSAGE_NAMESPACE_UUID, composed.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_matches_the_documented_scenario() {
        let message = Message {
            kind: "message".to_string(),
            content: "hello".to_string(),
            sending_time: TimeObj {
                date: "2025-04-14".to_string(),
                time: "22:34:41.991804".to_string(),
            },
            user_id: "111".to_string(),
            target_user_id: "222".to_string(),
        };

        // Pinned to the original implementation's output for this exact
        // input, rather than recomputed from the same composition string
        // this method builds — a recomputation can't catch a transposed
        // `unique_id` format string.
        let expected = Uuid::parse_str("920c7324-0dfc-53a3-8830-4692f861a00c").unwrap();

        assert_eq!(message.unique_id(), expected);
    }

    #[test]
    fn unique_id_is_stable_for_identical_fields() {
        let a = Message::new("hi", "alice", "bob");
        let b = a.clone();
        assert_eq!(a.unique_id(), b.unique_id());
    }

    #[test]
    fn unique_id_changes_with_content() {
        let a = Message::new("hi", "alice", "bob");
        let mut b = a.clone();
        b.content = "bye".to_string();
        assert_ne!(a.unique_id(), b.unique_id());
    }

    #[test]
    fn canonical_serialization_uses_type_message() {
        let message = Message::new("hi", "alice", "bob");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["content"], "hi");
    }
}
