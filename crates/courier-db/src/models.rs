//! Database row types — these map directly to SQLite rows.
//! Distinct from courier-types models: the normalized `Message` shape is
//! produced by the messaging layer, not here.

use chrono::{SecondsFormat, Utc};

/// A row in the direct layout: sender and receiver are stored explicitly.
pub struct DirectMessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

/// A row in the conversation layout: no receiver column; the message belongs
/// to a conversation and the receiver is inferred by the caller.
pub struct ConversationMessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

/// Timestamps are written from Rust rather than a SQL default so two inserts
/// in the same second still order correctly.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
