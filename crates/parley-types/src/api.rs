use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::models::MessageView;

fn default_limit() -> u32 {
    100
}

// -- Replies shared by several calls --

/// `{ "ok": true }`
#[derive(Debug, Serialize, Deserialize)]
pub struct OkReply {
    pub ok: bool,
}

impl OkReply {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// `{ "ok": false, "error": "<CODE>" }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub ok: bool,
    pub error: String,
}

impl ErrorReply {
    pub fn new(code: &str) -> Self {
        Self {
            ok: false,
            error: code.to_string(),
        }
    }
}

/// Body of calls that carry nothing but the session token.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    pub token: String,
}

// -- Accounts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginReply {
    pub ok: bool,
    pub token: String,
    pub user_id: i64,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub token: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupReply {
    pub ok: bool,
    pub conversation_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsurePairGroupRequest {
    pub token: String,
    pub other_user_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnsurePairGroupReply {
    pub ok: bool,
    pub conversation_id: i64,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaveGroupRequest {
    pub token: String,
    pub conversation_id: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendGroupMessageRequest {
    pub token: String,
    pub conversation_id: i64,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendGroupMessageReply {
    pub ok: bool,
    pub message_id: i64,
    /// Present and `true` when the message triggered a bot reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetMessagesRequest {
    pub token: String,
    pub conversation_id: i64,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetMessagesSinceRequest {
    pub token: String,
    pub conversation_id: i64,
    pub after_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesReply {
    pub ok: bool,
    pub messages: Vec<MessageView>,
}

// -- Long-poll --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitEventsRequest {
    pub token: String,
    #[serde(default)]
    pub after_event_id: i64,
    /// Falls back to the server's default wait when omitted.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsReply {
    pub ok: bool,
    pub events: Vec<Event>,
}
