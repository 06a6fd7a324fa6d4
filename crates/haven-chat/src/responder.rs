//! Reply generation.
//!
//! The pipeline asks a [`Responder`] for the assistant's text once the user
//! message is stored. Only a fixed-text placeholder ships today.

use async_trait::async_trait;

use crate::pipeline::SimilarMessage;

/// Produces the assistant reply for a user message.
///
/// Implementations own their failure handling: the pipeline always expects
/// a reply so that a stored user message is never left unanswered.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, message: &str, similar: &[SimilarMessage]) -> String;
}

/// Responder that always returns the same configured text.
#[derive(Debug, Clone)]
pub struct PlaceholderResponder {
    text: String,
}

impl PlaceholderResponder {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for PlaceholderResponder {
    fn default() -> Self {
        Self::new("This is an AI response placeholder. How can I help you today?")
    }
}

#[async_trait]
impl Responder for PlaceholderResponder {
    async fn respond(&self, _message: &str, _similar: &[SimilarMessage]) -> String {
        self.text.clone()
    }
}
