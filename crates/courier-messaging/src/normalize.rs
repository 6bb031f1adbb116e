//! Translation from store rows to the normalized `Message` shape. Layout
//! differences must not leak past this point: every message handed to a
//! caller has a populated sender, receiver, content, timestamp and read
//! flag, whichever layout the row came from.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use courier_db::models::{ConversationMessageRow, DirectMessageRow};
use courier_types::models::Message;

pub fn from_direct(row: DirectMessageRow) -> Message {
    Message {
        created_at: parse_timestamp(&row.created_at, &row.id),
        id: row.id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        content: row.content,
        read: row.read_at.is_some(),
    }
}

/// Conversation rows carry no receiver; it is inferred as the other party
/// relative to the requesting user.
pub fn from_conversation(row: ConversationMessageRow, user_id: &str, other_user_id: &str) -> Message {
    let receiver_id = if row.sender_id == user_id {
        other_user_id.to_string()
    } else {
        user_id.to_string()
    };

    Message {
        created_at: parse_timestamp(&row.created_at, &row.id),
        id: row.id,
        sender_id: row.sender_id,
        receiver_id,
        content: row.content,
        read: row.read_at.is_some(),
    }
}

/// SQLite timestamps are text. Courier writes RFC 3339, but foreign rows may
/// carry the bare "YYYY-MM-DD HH:MM:SS" form datetime('now') produces.
fn parse_timestamp(raw: &str, message_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message '{}': {}", raw, message_id, e);
            DateTime::default()
        })
}
