//! Haven Storage crate - SQLite persistence for chat message history.
//!
//! Provides a WAL-mode SQLite database with migrations and the message
//! repository backing the chat pipeline's relational store.

pub mod db;
pub mod messages;
pub mod migrations;

pub use db::Database;
pub use messages::{HistoryCursor, HistoryIter, MessageRepository, MessageScan, MessageStore};
