//! Route handler functions for all endpoints.
//!
//! Page handlers return HTML; the `/chat/history`, `/chat/similar` and
//! `/health` endpoints return JSON.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Form, Query, State};
use axum::response::Html;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use haven_chat::{ChatTurn, SimilarMessage};
use haven_core::types::HistoryEntry;

use crate::error::ApiError;
use crate::pages::{self, ChatPage, ExchangeFragment, LandingPage, SectionPage};
use crate::session::{read_session_id, Session};
use crate::state::AppState;

/// Upper bound for `/chat/similar?limit=`.
const MAX_SIMILAR_LIMIT: usize = 100;

// =============================================================================
// Request and response types
// =============================================================================

/// Form body for POST /chat/send.
#[derive(Debug, Deserialize)]
pub struct SendMessageForm {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: Option<String>,
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub session_id: Option<String>,
    pub removed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarResponse {
    pub query: String,
    pub results: Vec<SimilarMessage>,
    /// True when the vector subsystem could not answer.
    pub degraded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub collection: String,
    /// `None` when the vector store is unreachable.
    pub vector_count: Option<usize>,
}

// =============================================================================
// Pages
// =============================================================================

/// GET / - landing page.
pub async fn index() -> Result<Html<String>, ApiError> {
    pages::render(&LandingPage::default())
}

/// GET /chat - chat page with the current session's history.
///
/// Issues a session cookie on first visit.
pub async fn chat_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), ApiError> {
    let session = Session::resolve(&jar, state.cookie_name());
    let history = if session.is_new {
        Vec::new()
    } else {
        state.pipeline.history(&session.id)?
    };

    let page = pages::render(&ChatPage::new(&history))?;
    Ok((session.persist(jar, state.cookie_name()), page))
}

/// GET /journal
pub async fn journal() -> Result<Html<String>, ApiError> {
    pages::render(&SectionPage {
        title: "Journal",
        active: "/journal",
        blurb: "Write down what is on your mind. Journaling is coming soon.",
    })
}

/// GET /mood
pub async fn mood() -> Result<Html<String>, ApiError> {
    pages::render(&SectionPage {
        title: "Mood",
        active: "/mood",
        blurb: "Track how you feel day to day. Mood tracking is coming soon.",
    })
}

/// GET /social
pub async fn social() -> Result<Html<String>, ApiError> {
    pages::render(&SectionPage {
        title: "Social",
        active: "/social",
        blurb: "Stay in touch with the people who matter. Coming soon.",
    })
}

// =============================================================================
// Chat endpoints
// =============================================================================

/// POST /chat/send - run one chat turn and return the two message bubbles.
///
/// A request without a session cookie starts a new session.
pub async fn send_message(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SendMessageForm>,
) -> Result<(CookieJar, Html<String>), ApiError> {
    let message = form.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
    }

    let session = Session::resolve(&jar, state.cookie_name());
    let turn: ChatTurn = state.pipeline.handle_message(&session.id, message).await?;

    if turn.is_degraded() {
        tracing::info!(
            session_id = %session.id,
            user_index = ?turn.user_index,
            assistant_index = ?turn.assistant_index,
            "Chat turn completed in degraded mode"
        );
    }

    let fragment = pages::render(&ExchangeFragment::new(message, &turn.reply))?;
    Ok((session.persist(jar, state.cookie_name()), fragment))
}

/// GET /chat/history - the current session's messages, oldest first.
pub async fn get_history(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session_id = read_session_id(&jar, state.cookie_name());
    let messages = match &session_id {
        Some(id) => state.pipeline.history(id)?,
        None => Vec::new(),
    };
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

/// DELETE /chat/history - purge the current session.
pub async fn clear_history(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let session_id = read_session_id(&jar, state.cookie_name());
    let removed = match &session_id {
        Some(id) => state.pipeline.clear(id)?,
        None => 0,
    };
    Ok(Json(ClearHistoryResponse {
        session_id,
        removed,
    }))
}

/// GET /chat/similar?q=...&limit=... - nearest indexed messages.
///
/// Answers with an empty, `degraded` result when the vector subsystem
/// fails instead of an error status.
pub async fn similar(
    State(state): State<AppState>,
    params: Result<Query<SimilarParams>, QueryRejection>,
) -> Result<Json<SimilarResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let query = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Query parameter 'q' is required".to_string()))?;

    let limit = params
        .limit
        .unwrap_or(state.config.chat.similar_limit)
        .clamp(1, MAX_SIMILAR_LIMIT);

    match state.pipeline.similar(&query, limit).await {
        Ok(results) => Ok(Json(SimilarResponse {
            query,
            results,
            degraded: false,
        })),
        Err(e) if e.is_degradable() => {
            tracing::warn!(error = %e, "Similarity search degraded");
            Ok(Json(SimilarResponse {
                query,
                results: Vec::new(),
                degraded: true,
            }))
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - uptime and vector collection size.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let collection = state.pipeline.settings().collection.clone();
    let vector_count = match state.pipeline.vectors().count(&collection).await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::debug!(error = %e, "Vector count unavailable for health check");
            None
        }
    };

    Json(HealthResponse {
        status: if vector_count.is_some() {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        collection,
        vector_count,
    })
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("No such page".to_string())
}
