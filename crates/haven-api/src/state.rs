//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use haven_chat::RetrievalPipeline;
use haven_core::config::HavenConfig;

/// Shared application state.
///
/// Cloned into every handler; all fields are cheap `Arc` clones.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed for the lifetime of the server.
    pub config: Arc<HavenConfig>,
    /// Chat pipeline wired to the message and vector stores.
    pub pipeline: Arc<RetrievalPipeline>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: HavenConfig, pipeline: RetrievalPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            start_time: Instant::now(),
        }
    }

    /// Name of the session cookie.
    pub fn cookie_name(&self) -> &str {
        &self.config.session.cookie_name
    }
}
