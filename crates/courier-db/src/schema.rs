use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Which of the two supported message-store layouts a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaLayout {
    /// `messages` rows carry both `sender_id` and `receiver_id`.
    Direct,
    /// `messages` rows reference a `conversations` row; the receiver is
    /// inferred as the other participant.
    Conversation,
}

/// Determine which layout the store uses. Infallible: every probe failure
/// folds into the next fallback step, and `None` means no recognizable
/// message schema is present.
pub fn detect_layout(conn: &Connection) -> Option<SchemaLayout> {
    if !table_exists(conn, "messages") {
        return None;
    }

    // A statement selecting receiver_id only prepares if the column exists.
    if conn.prepare("SELECT receiver_id FROM messages LIMIT 1").is_ok() {
        return Some(SchemaLayout::Direct);
    }

    if table_exists(conn, "conversations") {
        return Some(SchemaLayout::Conversation);
    }

    None
}

fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .unwrap_or(false)
}

/// Provision the direct layout. Used by tests and by deployments that let
/// courier own the store; existing tables are left untouched.
pub fn install_direct(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            read_at     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);
        ",
    )?;

    info!("Provisioned direct-layout message store");
    Ok(())
}

/// Provision the conversation layout.
pub fn install_conversation(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            user_id         TEXT NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            read_at         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);
        ",
    )?;

    info!("Provisioned conversation-layout message store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_detects_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(detect_layout(&conn), None);
    }

    #[test]
    fn direct_store_detects_direct() {
        let conn = Connection::open_in_memory().unwrap();
        install_direct(&conn).unwrap();
        assert_eq!(detect_layout(&conn), Some(SchemaLayout::Direct));
    }

    #[test]
    fn conversation_store_detects_conversation() {
        let conn = Connection::open_in_memory().unwrap();
        install_conversation(&conn).unwrap();
        assert_eq!(detect_layout(&conn), Some(SchemaLayout::Conversation));
    }

    #[test]
    fn installers_are_noops_on_already_provisioned_stores() {
        let conn = Connection::open_in_memory().unwrap();
        install_direct(&conn).unwrap();
        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content) VALUES ('m1', 'a', 'b', 'kept')",
            [],
        )
        .unwrap();

        // Re-provisioning an existing store must not touch its data
        install_direct(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(detect_layout(&conn), Some(SchemaLayout::Direct));
    }

    #[test]
    fn unrelated_tables_detect_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE profiles (id TEXT PRIMARY KEY, bio TEXT);")
            .unwrap();
        assert_eq!(detect_layout(&conn), None);
    }

    #[test]
    fn messages_without_receiver_or_conversations_detects_nothing() {
        // A messages table alone, in neither layout, is not enough.
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE messages (id TEXT PRIMARY KEY, content TEXT);")
            .unwrap();
        assert_eq!(detect_layout(&conn), None);
    }
}
