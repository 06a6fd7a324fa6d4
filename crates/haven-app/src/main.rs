//! Haven application binary - composition root.
//!
//! Ties the Haven crates together into a single executable:
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Open the SQLite message store
//! 3. Create the vector store and embedding generator
//! 4. Build the retrieval pipeline, ensure the chat collection exists and
//!    reindex stored messages
//! 5. Start the axum HTTP server

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use haven_api::routes;
use haven_api::state::AppState;
use haven_chat::{chat_collection_schema, PipelineSettings, PlaceholderResponder, RetrievalPipeline};
use haven_core::config::{EmbeddingBackend, HavenConfig, VectorConfig};
use haven_storage::{Database, MessageRepository, MessageStore};
use haven_vector::{DynEmbeddingService, HashEmbedding, IvfVectorStore, RandomEmbedding};

use crate::cli::CliArgs;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn embedding_service(config: &VectorConfig) -> Arc<dyn DynEmbeddingService> {
    match config.embedding {
        EmbeddingBackend::Random => {
            tracing::warn!(
                dimension = config.dimension,
                "Using random placeholder embeddings; similarity results carry no meaning"
            );
            Arc::new(RandomEmbedding::new(config.dimension))
        }
        EmbeddingBackend::Hash => Arc::new(HashEmbedding::new(config.dimension)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = HavenConfig::load_or_default(&config_file);
    args.apply(&mut config);

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Haven v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");
    config.validate()?;

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join(&config.storage.database_file);
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let repository = Arc::new(
        MessageRepository::new(db).with_page_size(config.storage.history_page_size),
    );
    let messages: Arc<dyn MessageStore> = repository.clone();

    // Vectors.
    let embedder = embedding_service(&config.vector);
    let vectors = Arc::new(IvfVectorStore::new());
    tracing::info!(
        collection = %config.vector.collection,
        dimension = config.vector.dimension,
        metric = ?config.vector.metric,
        nlist = config.vector.nlist,
        nprobe = config.vector.nprobe,
        "In-process IVF vector store initialized"
    );

    // Pipeline.
    let pipeline = RetrievalPipeline::new(
        messages,
        embedder,
        vectors,
        Arc::new(PlaceholderResponder::new(config.chat.placeholder_response.clone())),
        PipelineSettings::from_config(&config.vector, &config.chat),
    );
    if pipeline.init(chat_collection_schema(&config.vector)).await {
        // Vectors are not persisted; rebuild them before accepting turns.
        let report = pipeline.rebuild_index(repository.scan()).await;
        if report.degraded > 0 || report.unreadable > 0 {
            tracing::warn!(
                degraded = report.degraded,
                unreadable = report.unreadable,
                "Some stored messages could not be reindexed"
            );
        }
    } else {
        tracing::warn!("Starting without vector search; chat history still works");
    }

    // === HTTP server ===
    let state = AppState::new(config.clone(), pipeline);
    tracing::info!(
        "Haven at http://{}:{}/chat",
        config.general.host,
        config.general.port
    );
    routes::start_server(&config, state).await?;

    tracing::info!("Haven stopped");
    Ok(())
}
