//! Database schema migrations.
//!
//! Applies the initial schema: the append-only `messages` table plus the
//! `schema_migrations` bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use haven_core::error::HavenError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), HavenError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| {
        HavenError::StoreUnavailable(format!("Failed to create migrations table: {}", e))
    })?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            HavenError::StoreUnavailable(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: messages");
    }

    Ok(())
}

/// Version 1: chat messages.
///
/// AUTOINCREMENT keeps ids strictly increasing even after a session purge
/// deletes the highest rows.
fn apply_v1(conn: &Connection) -> Result<(), HavenError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            content     TEXT NOT NULL CHECK (length(content) > 0),
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            timestamp   INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages (session_id, timestamp ASC, id ASC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'messages');
        ",
    )
    .map_err(|e| HavenError::StoreUnavailable(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_messages_default_timestamp() {
        let conn = open_test_conn();
        conn.execute(
            "INSERT INTO messages (session_id, content, role) VALUES ('s1', 'hello', 'user')",
            [],
        )
        .unwrap();

        let ts: i64 = conn
            .query_row("SELECT timestamp FROM messages", [], |row| row.get(0))
            .unwrap();
        assert!(ts > 1_600_000_000);
    }

    #[test]
    fn test_messages_role_check() {
        let conn = open_test_conn();
        let result = conn.execute(
            "INSERT INTO messages (session_id, content, role) VALUES ('s1', 'hi', 'system')",
            [],
        );
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_messages_empty_content_check() {
        let conn = open_test_conn();
        let result = conn.execute(
            "INSERT INTO messages (session_id, content, role) VALUES ('s1', '', 'user')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_autoincrement_never_reuses_ids() {
        let conn = open_test_conn();
        conn.execute(
            "INSERT INTO messages (session_id, content, role) VALUES ('s1', 'a', 'user')",
            [],
        )
        .unwrap();
        let first = conn.last_insert_rowid();
        conn.execute("DELETE FROM messages", []).unwrap();
        conn.execute(
            "INSERT INTO messages (session_id, content, role) VALUES ('s1', 'b', 'user')",
            [],
        )
        .unwrap();
        assert!(conn.last_insert_rowid() > first);
    }
}
