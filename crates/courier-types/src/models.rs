use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The normalized message shape handed to callers. Both store layouts map
/// onto this: in the conversation layout `receiver_id` is inferred as the
/// other participant relative to the requesting user.
///
/// Identifiers are opaque strings — foreign deployments own the rows and no
/// format is assumed; rows courier creates itself get UUIDv4 ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// One entry in a user's conversation listing: the peer, the newest message
/// exchanged with them, and how many of their messages are still unread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub other_user_id: String,
    /// Present only in the conversation layout; the direct layout has no
    /// conversation entity to point at.
    pub conversation_id: Option<String>,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}
