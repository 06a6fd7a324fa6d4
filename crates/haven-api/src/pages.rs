//! Server-rendered HTML pages and fragments.
//!
//! Templates live in `templates/` and share `base.html` for the layout and
//! navigation bar. Askama escapes every interpolated value in `.html`
//! templates, so user text is never trusted as markup.

use askama::Template;
use axum::response::Html;

use haven_core::types::{HistoryEntry, Role};

use crate::error::ApiError;

/// One chat bubble. User messages sit on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bubble<'a> {
    pub is_user: bool,
    pub content: &'a str,
}

impl<'a> Bubble<'a> {
    pub fn new(role: Role, content: &'a str) -> Self {
        Self {
            is_user: !role.is_assistant(),
            content,
        }
    }
}

impl<'a> From<&'a HistoryEntry> for Bubble<'a> {
    fn from(entry: &'a HistoryEntry) -> Self {
        Self::new(entry.role, &entry.content)
    }
}

/// Landing page.
#[derive(Template)]
#[template(path = "index.html")]
pub struct LandingPage<'a> {
    pub title: &'a str,
    pub active: &'a str,
}

impl Default for LandingPage<'_> {
    fn default() -> Self {
        Self {
            title: "Welcome",
            active: "/",
        }
    }
}

/// Chat page with the session's history rendered inline.
#[derive(Template)]
#[template(path = "chat.html")]
pub struct ChatPage<'a> {
    pub title: &'a str,
    pub active: &'a str,
    pub bubbles: Vec<Bubble<'a>>,
}

impl<'a> ChatPage<'a> {
    pub fn new(history: &'a [HistoryEntry]) -> Self {
        Self {
            title: "Chat",
            active: "/chat",
            bubbles: history.iter().map(Bubble::from).collect(),
        }
    }
}

/// Fragment returned for a sent message: the user bubble then the reply.
#[derive(Template)]
#[template(path = "exchange.html")]
pub struct ExchangeFragment<'a> {
    pub bubbles: Vec<Bubble<'a>>,
}

impl<'a> ExchangeFragment<'a> {
    pub fn new(user_message: &'a str, reply: &'a str) -> Self {
        Self {
            bubbles: vec![
                Bubble::new(Role::User, user_message),
                Bubble::new(Role::Assistant, reply),
            ],
        }
    }
}

/// Page for a section that has no functionality yet.
#[derive(Template)]
#[template(path = "section.html")]
pub struct SectionPage<'a> {
    pub title: &'a str,
    pub active: &'a str,
    pub blurb: &'a str,
}

/// Render `template` into an HTML response body.
pub fn render<T: Template>(template: &T) -> Result<Html<String>, ApiError> {
    template
        .render()
        .map(Html)
        .map_err(|e| ApiError::Internal(format!("Template rendering failed: {}", e)))
}
