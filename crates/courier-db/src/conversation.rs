//! Query set for the conversation layout: message rows have no receiver
//! column; they belong to a conversation whose participants determine who
//! the message is for.
//!
//! When more than one conversation links the same pair of users (possible in
//! stores written by older clients), the OLDEST conversation by
//! (created_at, id) is the canonical one for fetch and send. Read-marking
//! and unread counts cover all of them.

use crate::Database;
use crate::models::{ConversationMessageRow, now_rfc3339};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

impl Database {
    /// All conversations shared by the two users, oldest first.
    pub fn shared_conversations(&self, user_id: &str, other_user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| query_shared_conversations(conn, user_id, other_user_id))
    }

    /// The canonical conversation for a pair, if any exists.
    pub fn oldest_shared_conversation(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(query_shared_conversations(conn, user_id, other_user_id)?
                .into_iter()
                .next())
        })
    }

    /// Persist a message from `sender_id` to `receiver_id`, creating the
    /// shared conversation if none exists yet. Find-or-create and the
    /// message insert run in ONE transaction, so a failure can neither leave
    /// an orphaned empty conversation nor race a concurrent first send into
    /// a duplicate one.
    pub fn conversation_send(
        &self,
        message_id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<ConversationMessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let conversation_id =
                match query_shared_conversations(&tx, sender_id, receiver_id)?.into_iter().next() {
                    Some(id) => id,
                    None => {
                        let id = Uuid::new_v4().to_string();
                        tx.execute(
                            "INSERT INTO conversations (id, created_at) VALUES (?1, ?2)",
                            rusqlite::params![id, now_rfc3339()],
                        )?;
                        // OR IGNORE keeps a self-conversation (sender == receiver) from
                        // violating the participant primary key
                        tx.execute(
                            "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                             VALUES (?1, ?2), (?1, ?3)",
                            rusqlite::params![id, sender_id, receiver_id],
                        )?;
                        id
                    }
                };

            let created_at = now_rfc3339();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![message_id, conversation_id, sender_id, content, created_at],
            )?;

            tx.commit()?;

            Ok(ConversationMessageRow {
                id: message_id.to_string(),
                conversation_id,
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                created_at,
                read_at: None,
            })
        })
    }

    /// Messages of one conversation, ascending by creation time.
    pub fn conversation_history(&self, conversation_id: &str) -> Result<Vec<ConversationMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, created_at, read_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id], row_to_conversation_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Flip unread messages from `sender_id` to `user_id` to read, across
    /// ALL conversations the two share. Idempotent; returns the changed-row
    /// count.
    pub fn mark_conversation_read(&self, user_id: &str, sender_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_at = ?1
                 WHERE read_at IS NULL AND sender_id = ?2
                   AND conversation_id IN (
                       SELECT a.conversation_id
                       FROM conversation_participants a
                       JOIN conversation_participants b
                         ON b.conversation_id = a.conversation_id
                       WHERE a.user_id = ?3 AND b.user_id = ?2)",
                rusqlite::params![now_rfc3339(), sender_id, user_id],
            )?;
            Ok(changed as u64)
        })
    }

    /// Unread messages from `sender_id` to `user_id` across all shared
    /// conversations.
    pub fn conversation_unread_count(&self, user_id: &str, sender_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE read_at IS NULL AND sender_id = ?1
                   AND conversation_id IN (
                       SELECT a.conversation_id
                       FROM conversation_participants a
                       JOIN conversation_participants b
                         ON b.conversation_id = a.conversation_id
                       WHERE a.user_id = ?2 AND b.user_id = ?1)",
                [sender_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Unread messages addressed to `user_id` within one conversation.
    pub fn conversation_unread_in(&self, conversation_id: &str, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
                [conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Every conversation the user belongs to, most recent activity first.
    pub fn conversations_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cp.conversation_id
                 FROM conversation_participants cp
                 JOIN conversations c ON c.id = cp.conversation_id
                 LEFT JOIN messages m ON m.conversation_id = cp.conversation_id
                 WHERE cp.user_id = ?1
                 GROUP BY cp.conversation_id
                 ORDER BY COALESCE(MAX(m.created_at), c.created_at) DESC",
            )?;

            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(ids)
        })
    }

    pub fn conversation_participants(&self, conversation_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM conversation_participants
                 WHERE conversation_id = ?1
                 ORDER BY user_id",
            )?;

            let ids = stmt
                .query_map([conversation_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(ids)
        })
    }

    pub fn conversation_last_message(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, created_at, read_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
            )?;

            let row = stmt
                .query_row([conversation_id], row_to_conversation_message)
                .optional()?;

            Ok(row)
        })
    }
}

fn query_shared_conversations(
    conn: &Connection,
    user_id: &str,
    other_user_id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT c.id
         FROM conversations c
         JOIN conversation_participants a
           ON a.conversation_id = c.id AND a.user_id = ?1
         JOIN conversation_participants b
           ON b.conversation_id = c.id AND b.user_id = ?2
         ORDER BY c.created_at ASC, c.id ASC",
    )?;

    let ids = stmt
        .query_map([user_id, other_user_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(ids)
}

fn row_to_conversation_message(row: &rusqlite::Row) -> rusqlite::Result<ConversationMessageRow> {
    Ok(ConversationMessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        read_at: row.get(5)?,
    })
}
