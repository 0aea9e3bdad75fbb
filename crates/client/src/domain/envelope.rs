//! Wire envelope — `{type, user_id, content}`, mirroring the signaling
//! server's frame shape exactly (both sides speak the same wire format).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    pub fn from_user(kind: impl Into<String>, user_id: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            user_id: Some(user_id.into()),
            content,
        }
    }
}

/// Names of every request type in the catalog (§4.1), so call sites never
/// hand-type a typo'd literal.
pub mod kind {
    pub const ADD_USER: &str = "add_user_to_data_base";
    pub const ADD_USER_RESPONSE: &str = "add_user_to_data_base_response";
    pub const GET_USER_INFO: &str = "get_user_info_from_data_base";
    pub const GET_USER_INFO_RESPONSE: &str = "get_user_info_from_data_base_response";
    pub const LOGIN_REQUEST: &str = "login_request";
    pub const CREATED_CHATS: &str = "created_chats";
    pub const CHECK_USER_EXISTENCE: &str = "check_user_existance_request";
    pub const REGISTER_REQUEST: &str = "register_request";
    pub const SEND_STORED_MESSAGES: &str = "send_stored_messages";
    pub const REGISTER_RESPONSE: &str = "register_response";
    pub const GET_TARGET_USER_STATUS: &str = "get_target_user_status_request";
    pub const TARGET_USER_STATUS_RESPONSE: &str = "target_user_status_response";
    pub const CONNECTION_REQUEST: &str = "connection_request";
    pub const CONNECTION_RESPONSE: &str = "connection_response";
    pub const SHARE_OFFER: &str = "share_offer_request";
    pub const SHARE_ANSWER: &str = "share_answer_request";
    pub const RELAY_MESSAGE: &str = "relay_message_request";
    pub const CREATE_CHAT: &str = "create_chat_request";
    pub const GET_LONG_TERM_PUBLIC_KEY: &str = "get_long_term_public_key_request";
    pub const GET_LONG_TERM_PUBLIC_KEY_RESPONSE: &str = "get_long_term_public_key_response";
    pub const SEND_LONG_TERM_PUBLIC_KEY: &str = "send_long_term_public_key_request";
    pub const CONNECTION_ESTABLISHMENT_REQUEST: &str = "connection_establishment_request";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_json() {
        let env = Envelope::from_user(kind::RELAY_MESSAGE, "alice", json!({"target_user": "bob"}));
        let text = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.kind, kind::RELAY_MESSAGE);
        assert_eq!(back.user_id.as_deref(), Some("alice"));
    }
}
