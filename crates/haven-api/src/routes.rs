//! Router setup with all routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression and a body
//! size limit.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use haven_core::config::HavenConfig;
use haven_core::error::HavenError;

use crate::handlers;
use crate::state::AppState;

/// Largest request body accepted, in bytes.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let pages = Router::new()
        .route("/", get(handlers::index))
        .route("/chat", get(handlers::chat_page))
        .route("/journal", get(handlers::journal))
        .route("/mood", get(handlers::mood))
        .route("/social", get(handlers::social));

    let chat = Router::new()
        .route("/chat/send", post(handlers::send_message))
        .route(
            "/chat/history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route("/chat/similar", get(handlers::similar));

    pages
        .merge(chat)
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured host and port.
pub async fn start_server(config: &HavenConfig, state: AppState) -> Result<(), HavenError> {
    let addr = format!("{}:{}", config.general.host, config.general.port);

    let router = create_router(state);

    tracing::info!("Starting Haven server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HavenError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| HavenError::Api(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
