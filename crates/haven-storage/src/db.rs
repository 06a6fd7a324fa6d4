//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use haven_core::error::HavenError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// The mutex is held only while a single statement (or a short batch) runs,
/// so requests for different sessions interleave at statement granularity.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=FULL, foreign keys, and runs all
    /// pending migrations.
    pub fn new(path: &Path) -> Result<Self, HavenError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| {
            HavenError::StoreUnavailable(format!("Failed to open database: {}", e))
        })?;

        // FULL so every commit is durable when the call returns.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| HavenError::StoreUnavailable(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        Self::with_migrations(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, HavenError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            HavenError::StoreUnavailable(format!("Failed to open in-memory db: {}", e))
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| HavenError::StoreUnavailable(format!("Failed to set pragmas: {}", e)))?;

        Self::with_migrations(conn)
    }

    fn with_migrations(conn: Connection) -> Result<Self, HavenError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// This is the primary way to interact with the database. The mutex
    /// is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, HavenError>
    where
        F: FnOnce(&Connection) -> Result<T, HavenError>,
    {
        let conn = self.conn.lock().map_err(|e| {
            HavenError::StoreUnavailable(format!("Database lock poisoned: {}", e))
        })?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_messages(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(|e| HavenError::StoreUnavailable(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_messages(&db), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat_history.db");
        let db = Database::new(&path).unwrap();

        assert_eq!(count_messages(&db), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_file_database_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.db");

        {
            let db = Database::new(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO messages (session_id, content, role) VALUES ('s1', 'hi', 'user')",
                    [],
                )
                .map_err(|e| HavenError::StoreUnavailable(e.to_string()))?;
                Ok(())
            })
            .unwrap();
        }

        let db = Database::new(&path).unwrap();
        assert_eq!(count_messages(&db), 1);
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| HavenError::StoreUnavailable(e.to_string()))
            })
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
