//! Haven API crate - axum HTTP server, pages and JSON endpoints.
//!
//! Serves the chat UI (landing, chat, journal, mood and social pages), the
//! HTMX-style message endpoint, JSON history and similarity endpoints, and
//! a health check.

pub mod error;
pub mod handlers;
pub mod pages;
pub mod routes;
pub mod session;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
