//! Chat message repository.
//!
//! Messages are append-only. A session's history is read through a
//! keyset-paginated [`HistoryCursor`], so long conversations are streamed
//! page by page instead of being loaded in one query.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;

use haven_core::error::HavenError;
use haven_core::types::{HistoryEntry, Message, MessageId, Role, SessionSummary};

use crate::db::Database;

const DEFAULT_PAGE_SIZE: usize = 256;

/// The relational surface the chat pipeline depends on.
///
/// Implemented by [`MessageRepository`]; tests substitute their own doubles.
pub trait MessageStore: Send + Sync {
    /// Persist a message and return its newly assigned identifier.
    fn append(&self, session_id: &str, content: &str, role: Role) -> Result<MessageId, HavenError>;

    /// All messages of a session, oldest first. Empty for unknown sessions.
    fn history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, HavenError>;

    /// Delete every message of a session, returning how many were removed.
    fn purge(&self, session_id: &str) -> Result<u64, HavenError>;
}

/// SQLite-backed message repository.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    db: Arc<Database>,
    page_size: usize,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the number of rows fetched per history page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Lazy, restartable view over a session's history.
    pub fn history_cursor(&self, session_id: &str) -> HistoryCursor {
        HistoryCursor {
            db: Arc::clone(&self.db),
            session_id: session_id.to_string(),
            page_size: self.page_size,
        }
    }

    /// Find a message by ID.
    pub fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, HavenError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, content, role, timestamp
                     FROM messages WHERE id = ?1",
                )
                .map_err(store_err)?;

            let result = stmt
                .query_row(rusqlite::params![id], |row| Ok(row_to_message(row)))
                .optional()
                .map_err(store_err)?;

            match result {
                Some(message) => Ok(Some(message?)),
                None => Ok(None),
            }
        })
    }

    /// Count the messages of a session.
    pub fn count(&self, session_id: &str) -> Result<u64, HavenError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| row.get(0),
                )
                .map_err(store_err)?;
            Ok(count as u64)
        })
    }

    /// Every stored message across all sessions, in id order.
    ///
    /// Used to rebuild derived indexes after a restart.
    pub fn scan(&self) -> MessageScan {
        MessageScan {
            db: Arc::clone(&self.db),
            page_size: self.page_size,
            buffer: VecDeque::new(),
            after: 0,
            exhausted: false,
        }
    }

    /// Up to `limit` messages with an id greater than `after_id`.
    pub fn messages_after(
        &self,
        after_id: MessageId,
        limit: usize,
    ) -> Result<Vec<Message>, HavenError> {
        fetch_messages_after(&self.db, after_id, limit)
    }

    /// List known sessions, most recently active first.
    pub fn list_sessions(&self, limit: u64) -> Result<Vec<SessionSummary>, HavenError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, COUNT(*), MAX(timestamp)
                     FROM messages
                     GROUP BY session_id
                     ORDER BY MAX(timestamp) DESC, MAX(id) DESC
                     LIMIT ?1",
                )
                .map_err(store_err)?;

            let rows = stmt
                .query_map(rusqlite::params![limit], |row| {
                    let session_id: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    let last: i64 = row.get(2)?;
                    Ok((session_id, count, last))
                })
                .map_err(store_err)?;

            let mut sessions = Vec::new();
            for row in rows {
                let (session_id, count, last) = row.map_err(store_err)?;
                sessions.push(SessionSummary {
                    session_id,
                    message_count: count as u64,
                    last_activity: to_datetime(last)?,
                });
            }
            Ok(sessions)
        })
    }
}

impl MessageStore for MessageRepository {
    fn append(&self, session_id: &str, content: &str, role: Role) -> Result<MessageId, HavenError> {
        if session_id.trim().is_empty() {
            return Err(HavenError::Validation(
                "Session id cannot be empty".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(HavenError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }

        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (session_id, content, role) VALUES (?1, ?2, ?3)",
                rusqlite::params![session_id, content, role.as_str()],
            )
            .map_err(|e| HavenError::StoreUnavailable(format!("Failed to save message: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })?;

        debug!(session_id, message_id = id, role = %role, "Message appended");
        Ok(id)
    }

    fn history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, HavenError> {
        self.history_cursor(session_id).collect_all()
    }

    fn purge(&self, session_id: &str) -> Result<u64, HavenError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                rusqlite::params![session_id],
            )
            .map_err(|e| {
                HavenError::StoreUnavailable(format!("Failed to delete chat history: {}", e))
            })
        })?;

        debug!(session_id, removed, "Session purged");
        Ok(removed as u64)
    }
}

// ============================================================================
// History cursor
// ============================================================================

/// A session's history as a lazy sequence.
///
/// Each call to [`HistoryCursor::iter`] starts again from the oldest message
/// and fetches rows in pages ordered by `(timestamp, id)`.
#[derive(Debug, Clone)]
pub struct HistoryCursor {
    db: Arc<Database>,
    session_id: String,
    page_size: usize,
}

impl HistoryCursor {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            cursor: self,
            buffer: VecDeque::new(),
            after: None,
            exhausted: false,
        }
    }

    /// Drain the whole sequence into a vector.
    pub fn collect_all(&self) -> Result<Vec<HistoryEntry>, HavenError> {
        self.iter().collect()
    }

    fn fetch_page(
        &self,
        after: Option<(i64, MessageId)>,
    ) -> Result<Vec<(i64, HistoryEntry)>, HavenError> {
        let (after_ts, after_id) = after.unwrap_or((i64::MIN, MessageId::MIN));

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, content, role, timestamp
                     FROM messages
                     WHERE session_id = ?1
                       AND (timestamp > ?2 OR (timestamp = ?2 AND id > ?3))
                     ORDER BY timestamp ASC, id ASC
                     LIMIT ?4",
                )
                .map_err(store_err)?;

            let rows = stmt
                .query_map(
                    rusqlite::params![self.session_id, after_ts, after_id, self.page_size as i64],
                    |row| Ok(row_to_history_entry(row)),
                )
                .map_err(store_err)?;

            let mut page = Vec::with_capacity(self.page_size);
            for row in rows {
                page.push(row.map_err(store_err)??);
            }
            Ok(page)
        })
    }
}

impl<'a> IntoIterator for &'a HistoryCursor {
    type Item = Result<HistoryEntry, HavenError>;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator produced by [`HistoryCursor::iter`].
pub struct HistoryIter<'a> {
    cursor: &'a HistoryCursor,
    buffer: VecDeque<HistoryEntry>,
    after: Option<(i64, MessageId)>,
    exhausted: bool,
}

impl Iterator for HistoryIter<'_> {
    type Item = Result<HistoryEntry, HavenError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.cursor.fetch_page(self.after) {
                Ok(page) => {
                    if page.len() < self.cursor.page_size {
                        self.exhausted = true;
                    }
                    if let Some((ts, entry)) = page.last() {
                        self.after = Some((*ts, entry.id));
                    }
                    self.buffer.extend(page.into_iter().map(|(_, entry)| entry));
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}

// ============================================================================
// Full scan
// ============================================================================

/// Iterator over all messages, fetched in id-ordered pages.
pub struct MessageScan {
    db: Arc<Database>,
    page_size: usize,
    buffer: VecDeque<Message>,
    after: MessageId,
    exhausted: bool,
}

impl Iterator for MessageScan {
    type Item = Result<Message, HavenError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match fetch_messages_after(&self.db, self.after, self.page_size) {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.exhausted = true;
                    }
                    if let Some(last) = page.last() {
                        self.after = last.id;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}

fn fetch_messages_after(
    db: &Database,
    after_id: MessageId,
    limit: usize,
) -> Result<Vec<Message>, HavenError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, content, role, timestamp
                 FROM messages
                 WHERE id > ?1
                 ORDER BY id ASC
                 LIMIT ?2",
            )
            .map_err(store_err)?;

        let rows = stmt
            .query_map(rusqlite::params![after_id, limit as i64], |row| {
                Ok(row_to_message(row))
            })
            .map_err(store_err)?;

        let mut page = Vec::new();
        for row in rows {
            page.push(row.map_err(store_err)??);
        }
        Ok(page)
    })
}

// ============================================================================
// Helper functions for row-to-entity conversion.
// ============================================================================

fn store_err(e: rusqlite::Error) -> HavenError {
    HavenError::StoreUnavailable(e.to_string())
}

fn to_datetime(secs: i64) -> Result<DateTime<Utc>, HavenError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| HavenError::StoreUnavailable(format!("Invalid timestamp: {}", secs)))
}

fn parse_role(raw: &str) -> Result<Role, HavenError> {
    raw.parse::<Role>()
        .map_err(|_| HavenError::StoreUnavailable(format!("Invalid role in database: {}", raw)))
}

fn row_to_history_entry(row: &rusqlite::Row<'_>) -> Result<(i64, HistoryEntry), HavenError> {
    let id: i64 = row.get(0).map_err(store_err)?;
    let content: String = row.get(1).map_err(store_err)?;
    let role: String = row.get(2).map_err(store_err)?;
    let ts: i64 = row.get(3).map_err(store_err)?;

    Ok((
        ts,
        HistoryEntry {
            id,
            content,
            role: parse_role(&role)?,
            timestamp: to_datetime(ts)?,
        },
    ))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, HavenError> {
    let id: i64 = row.get(0).map_err(store_err)?;
    let session_id: String = row.get(1).map_err(store_err)?;
    let content: String = row.get(2).map_err(store_err)?;
    let role: String = row.get(3).map_err(store_err)?;
    let ts: i64 = row.get(4).map_err(store_err)?;

    Ok(Message {
        id,
        session_id,
        content,
        role: parse_role(&role)?,
        timestamp: to_datetime(ts)?,
    })
}
