//! Query set for the direct layout: every message row carries an explicit
//! sender and receiver.

use crate::Database;
use crate::models::{DirectMessageRow, now_rfc3339};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

impl Database {
    pub fn insert_direct_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<DirectMessageRow> {
        self.with_conn(|conn| {
            let created_at = now_rfc3339();
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender_id, receiver_id, content, created_at],
            )?;

            Ok(DirectMessageRow {
                id: id.to_string(),
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                content: content.to_string(),
                created_at,
                read_at: None,
            })
        })
    }

    /// Full history between two users, ascending by creation time.
    pub fn direct_history(&self, user_id: &str, other_user_id: &str) -> Result<Vec<DirectMessageRow>> {
        self.with_conn(|conn| query_direct_history(conn, user_id, other_user_id))
    }

    /// Flip unread messages from `sender_id` to `user_id` to read.
    /// Idempotent: already-read rows are untouched. Returns the number of
    /// rows that changed.
    pub fn mark_direct_read(&self, user_id: &str, sender_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_at = ?1
                 WHERE receiver_id = ?2 AND sender_id = ?3 AND read_at IS NULL",
                rusqlite::params![now_rfc3339(), user_id, sender_id],
            )?;
            Ok(changed as u64)
        })
    }

    pub fn direct_unread_count(&self, user_id: &str, sender_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND sender_id = ?2 AND read_at IS NULL",
                [user_id, sender_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Everyone the user has exchanged messages with, most recent exchange
    /// first.
    pub fn direct_partners(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS partner,
                        MAX(created_at) AS last_at
                 FROM messages
                 WHERE sender_id = ?1 OR receiver_id = ?1
                 GROUP BY partner
                 ORDER BY last_at DESC",
            )?;

            let partners = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(partners)
        })
    }

    pub fn direct_last_message(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Option<DirectMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, created_at, read_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
            )?;

            let row = stmt
                .query_row([user_id, other_user_id], row_to_direct)
                .optional()?;

            Ok(row)
        })
    }
}

fn query_direct_history(
    conn: &Connection,
    user_id: &str,
    other_user_id: &str,
) -> Result<Vec<DirectMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, content, created_at, read_at
         FROM messages
         WHERE (sender_id = ?1 AND receiver_id = ?2)
            OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([user_id, other_user_id], row_to_direct)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn row_to_direct(row: &rusqlite::Row) -> rusqlite::Result<DirectMessageRow> {
    Ok(DirectMessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        read_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::schema;

    fn store() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| schema::install_direct(conn)).unwrap();
        db
    }

    #[test]
    fn history_covers_both_directions_in_order() {
        let db = store();
        db.insert_direct_message("m1", "a", "b", "hello").unwrap();
        db.insert_direct_message("m2", "b", "a", "hi back").unwrap();
        db.insert_direct_message("m3", "a", "c", "unrelated").unwrap();

        let history = db.direct_history("a", "b").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].content, "hi back");

        // Same pair queried from the other side
        let mirrored = db.direct_history("b", "a").unwrap();
        assert_eq!(mirrored.len(), 2);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = store();
        db.insert_direct_message("m1", "b", "a", "one").unwrap();
        db.insert_direct_message("m2", "b", "a", "two").unwrap();

        assert_eq!(db.direct_unread_count("a", "b").unwrap(), 2);
        assert_eq!(db.mark_direct_read("a", "b").unwrap(), 2);
        assert_eq!(db.direct_unread_count("a", "b").unwrap(), 0);

        // Second invocation touches nothing
        assert_eq!(db.mark_direct_read("a", "b").unwrap(), 0);
    }

    #[test]
    fn mark_read_only_targets_the_given_sender() {
        let db = store();
        db.insert_direct_message("m1", "b", "a", "from b").unwrap();
        db.insert_direct_message("m2", "c", "a", "from c").unwrap();

        db.mark_direct_read("a", "b").unwrap();
        assert_eq!(db.direct_unread_count("a", "b").unwrap(), 0);
        assert_eq!(db.direct_unread_count("a", "c").unwrap(), 1);
    }

    #[test]
    fn partners_ordered_by_recency() {
        let db = store();
        db.insert_direct_message("m1", "a", "b", "first").unwrap();
        db.insert_direct_message("m2", "c", "a", "second").unwrap();

        let partners = db.direct_partners("a").unwrap();
        assert_eq!(partners, vec!["c".to_string(), "b".to_string()]);

        let last = db.direct_last_message("a", "c").unwrap().unwrap();
        assert_eq!(last.content, "second");
    }
}
