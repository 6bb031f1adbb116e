use serde::{Deserialize, Serialize};

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub user_id: String,
    pub sender_id: String,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub unread: u64,
}
