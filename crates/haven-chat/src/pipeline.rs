//! Retrieval pipeline: store, embed, index, search, respond.
//!
//! Each user message is persisted first so it has a durable identifier.
//! Embedding and vector indexing follow and are best effort: when either
//! fails the turn still completes and the failure is reported through an
//! [`IndexOutcome`] instead of an error.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use haven_core::config::{ChatConfig, VectorConfig};
use haven_core::error::HavenError;
use haven_core::types::{HistoryEntry, Message, MessageId, Role};
use haven_storage::MessageStore;
use haven_vector::{
    CollectionSchema, DynEmbeddingService, EntryId, IvfParams, ScalarFields, ScalarKind,
    SearchHit, VectorStore,
};

use crate::responder::Responder;

/// Scalar field holding the message text.
pub const FIELD_MESSAGE: &str = "message";
/// Scalar field flagging assistant messages.
pub const FIELD_IS_AI: &str = "is_ai";
/// Scalar field holding the message time in Unix seconds.
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Schema of the chat message collection described by `config`.
pub fn chat_collection_schema(config: &VectorConfig) -> CollectionSchema {
    CollectionSchema::new(config.collection.clone(), config.dimension)
        .with_metric(config.metric)
        .with_field(FIELD_MESSAGE, ScalarKind::Text)
        .with_field(FIELD_IS_AI, ScalarKind::Bool)
        .with_field(FIELD_TIMESTAMP, ScalarKind::Int)
        .with_ivf(IvfParams {
            nlist: config.nlist,
            nprobe: config.nprobe,
            train_threshold: config.train_threshold,
            iterations: config.kmeans_iterations,
        })
        .with_description("Chat messages with embeddings")
}

/// Progress of a single chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    PersistedUser,
    EmbeddedUser,
    IndexedUser,
    PersistedAssistant,
    EmbeddedAssistant,
    IndexedAssistant,
    Complete,
}

impl PipelineStage {
    fn embedded(role: Role) -> Self {
        match role {
            Role::User => PipelineStage::EmbeddedUser,
            Role::Assistant => PipelineStage::EmbeddedAssistant,
        }
    }

    fn indexed(role: Role) -> Self {
        match role {
            Role::User => PipelineStage::IndexedUser,
            Role::Assistant => PipelineStage::IndexedAssistant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::PersistedUser => "persisted_user",
            PipelineStage::EmbeddedUser => "embedded_user",
            PipelineStage::IndexedUser => "indexed_user",
            PipelineStage::PersistedAssistant => "persisted_assistant",
            PipelineStage::EmbeddedAssistant => "embedded_assistant",
            PipelineStage::IndexedAssistant => "indexed_assistant",
            PipelineStage::Complete => "complete",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of embedding and indexing one persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed { entry_id: EntryId },
    /// `stage` is the stage that could not be reached.
    Degraded { stage: PipelineStage, reason: String },
}

impl IndexOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IndexOutcome::Indexed { .. })
    }
}

/// A prior message found close to the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMessage {
    pub message_id: MessageId,
    pub message: Option<String>,
    pub is_ai: Option<bool>,
    pub similarity: f64,
}

impl From<SearchHit> for SimilarMessage {
    fn from(hit: SearchHit) -> Self {
        Self {
            message_id: hit.owner_id,
            message: hit
                .fields
                .get(FIELD_MESSAGE)
                .and_then(|v| v.as_text())
                .map(str::to_string),
            is_ai: hit.fields.get(FIELD_IS_AI).and_then(|v| v.as_bool()),
            similarity: hit.similarity,
        }
    }
}

/// Everything produced by one completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub session_id: String,
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    pub reply: String,
    pub user_index: IndexOutcome,
    pub assistant_index: IndexOutcome,
    /// `None` when the lookup was disabled or could not run.
    pub similar: Option<Vec<SimilarMessage>>,
}

impl ChatTurn {
    /// True if either message was left out of the vector store.
    pub fn is_degraded(&self) -> bool {
        !self.user_index.is_indexed() || !self.assistant_index.is_indexed()
    }
}

/// Counts from [`RetrievalPipeline::rebuild_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub indexed: usize,
    /// Messages read but left out of the vector store.
    pub degraded: usize,
    /// Rows the message store failed to return.
    pub unreadable: usize,
}

/// Tunables for [`RetrievalPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub collection: String,
    /// Neighbours fetched per user message; 0 disables the lookup.
    pub similar_limit: usize,
    /// Upper bound on message length, in characters.
    pub max_message_length: usize,
}

impl PipelineSettings {
    pub fn from_config(vector: &VectorConfig, chat: &ChatConfig) -> Self {
        Self {
            collection: vector.collection.clone(),
            similar_limit: chat.similar_limit,
            max_message_length: chat.max_message_length,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&VectorConfig::default(), &ChatConfig::default())
    }
}

/// Coordinates the message store, embedding service, vector store and
/// responder for each chat turn.
pub struct RetrievalPipeline {
    messages: Arc<dyn MessageStore>,
    embedder: Arc<dyn DynEmbeddingService>,
    vectors: Arc<dyn VectorStore>,
    responder: Arc<dyn Responder>,
    settings: PipelineSettings,
}

impl RetrievalPipeline {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        embedder: Arc<dyn DynEmbeddingService>,
        vectors: Arc<dyn VectorStore>,
        responder: Arc<dyn Responder>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            messages,
            embedder,
            vectors,
            responder,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    /// Create the chat collection if needed.
    ///
    /// Returns `false` when the vector store refused; the pipeline then runs
    /// degraded until the collection becomes available.
    pub async fn init(&self, schema: CollectionSchema) -> bool {
        match self.vectors.ensure_collection(schema).await {
            Ok(created) => {
                info!(
                    collection = %self.settings.collection,
                    created,
                    "Vector collection ready"
                );
                true
            }
            Err(e) => {
                warn!(
                    collection = %self.settings.collection,
                    error = %e,
                    "Vector collection unavailable, similarity features disabled"
                );
                false
            }
        }
    }

    /// Re-embed and index already persisted messages.
    ///
    /// The vector store lives in memory, so after a restart it is empty while
    /// the message store still holds every prior turn. Each message keeps its
    /// stored timestamp. Failures are counted, never returned.
    pub async fn rebuild_index<I>(&self, messages: I) -> RebuildReport
    where
        I: IntoIterator<Item = Result<Message, HavenError>>,
    {
        let mut report = RebuildReport::default();
        for message in messages {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable message during reindex");
                    report.unreadable += 1;
                    continue;
                }
            };

            let vector = self.embed(message.id, &message.content).await;
            let outcome = self
                .index(
                    message.id,
                    message.role,
                    &message.content,
                    message.timestamp.timestamp(),
                    vector,
                )
                .await;
            if outcome.is_indexed() {
                report.indexed += 1;
            } else {
                report.degraded += 1;
            }
        }

        info!(
            collection = %self.settings.collection,
            indexed = report.indexed,
            degraded = report.degraded,
            unreadable = report.unreadable,
            "Vector index rebuilt from stored messages"
        );
        report
    }

    /// Run one chat turn for `session_id`.
    ///
    /// Fails only on invalid input or when the message store is unavailable.
    pub async fn handle_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<ChatTurn, HavenError> {
        let text = message.trim();
        self.validate(session_id, text)?;
        debug!(session_id, stage = %PipelineStage::Received, "Chat turn started");

        let user_message_id = self.messages.append(session_id, text, Role::User)?;
        debug!(
            session_id,
            message_id = user_message_id,
            stage = %PipelineStage::PersistedUser,
            "User message stored"
        );

        let user_vector = self.embed(user_message_id, text).await;
        let similar = match &user_vector {
            Ok(vector) if self.settings.similar_limit > 0 => {
                self.lookup(vector, self.settings.similar_limit).await.ok()
            }
            _ => None,
        };
        let user_index = self
            .index(user_message_id, Role::User, text, Utc::now().timestamp(), user_vector)
            .await;

        let reply = self
            .responder
            .respond(text, similar.as_deref().unwrap_or(&[]))
            .await;

        let assistant_message_id = self
            .messages
            .append(session_id, &reply, Role::Assistant)?;
        debug!(
            session_id,
            message_id = assistant_message_id,
            stage = %PipelineStage::PersistedAssistant,
            "Assistant message stored"
        );

        let assistant_vector = self.embed(assistant_message_id, &reply).await;
        let assistant_index = self
            .index(
                assistant_message_id,
                Role::Assistant,
                &reply,
                Utc::now().timestamp(),
                assistant_vector,
            )
            .await;

        let turn = ChatTurn {
            session_id: session_id.to_string(),
            user_message_id,
            assistant_message_id,
            reply,
            user_index,
            assistant_index,
            similar,
        };

        info!(
            session_id,
            user_message_id,
            assistant_message_id,
            degraded = turn.is_degraded(),
            stage = %PipelineStage::Complete,
            "Chat turn complete"
        );
        Ok(turn)
    }

    /// Messages whose vectors lie closest to `query`.
    ///
    /// Unlike [`handle_message`](Self::handle_message) this surfaces
    /// embedding and vector store errors; callers decide how to degrade.
    pub async fn similar(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SimilarMessage>, HavenError> {
        let vector = self.embedder.embed_boxed(query).await?;
        let hits = self
            .vectors
            .search(&self.settings.collection, &vector, limit)
            .await?;
        Ok(hits.into_iter().map(SimilarMessage::from).collect())
    }

    /// Full history of a session, oldest first.
    pub fn history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, HavenError> {
        self.messages.history(session_id)
    }

    /// Delete every stored message of a session.
    ///
    /// Vector entries are left in place; they only carry the message text
    /// as a scalar field and are not tied to the session.
    pub fn clear(&self, session_id: &str) -> Result<u64, HavenError> {
        let removed = self.messages.purge(session_id)?;
        info!(session_id, removed, "Session history cleared");
        Ok(removed)
    }

    fn validate(&self, session_id: &str, text: &str) -> Result<(), HavenError> {
        if session_id.trim().is_empty() {
            return Err(HavenError::Validation(
                "Session id cannot be empty".to_string(),
            ));
        }
        if text.is_empty() {
            return Err(HavenError::Validation("Message cannot be empty".to_string()));
        }
        let length = text.chars().count();
        if length > self.settings.max_message_length {
            return Err(HavenError::Validation(format!(
                "Message too long: {} characters (max {})",
                length, self.settings.max_message_length
            )));
        }
        Ok(())
    }

    async fn embed(&self, message_id: MessageId, text: &str) -> Result<Vec<f32>, HavenError> {
        let vector = self.embedder.embed_boxed(text).await?;
        debug!(message_id, dimensions = vector.len(), "Message embedded");
        Ok(vector)
    }

    async fn lookup(&self, vector: &[f32], limit: usize) -> Result<Vec<SimilarMessage>, HavenError> {
        match self
            .vectors
            .search(&self.settings.collection, vector, limit)
            .await
        {
            Ok(hits) => {
                debug!(hits = hits.len(), "Similarity lookup done");
                Ok(hits.into_iter().map(SimilarMessage::from).collect())
            }
            Err(e) => {
                warn!(error = %e, "Similarity lookup failed, continuing without context");
                Err(e)
            }
        }
    }

    async fn index(
        &self,
        message_id: MessageId,
        role: Role,
        text: &str,
        timestamp: i64,
        vector: Result<Vec<f32>, HavenError>,
    ) -> IndexOutcome {
        let vector = match vector {
            Ok(v) => v,
            Err(e) => return self.degraded(message_id, PipelineStage::embedded(role), e),
        };

        let mut fields = ScalarFields::new();
        fields.insert(FIELD_MESSAGE.to_string(), text.into());
        fields.insert(FIELD_IS_AI.to_string(), role.is_assistant().into());
        fields.insert(FIELD_TIMESTAMP.to_string(), timestamp.into());

        match self
            .vectors
            .insert(&self.settings.collection, message_id, vector, fields)
            .await
        {
            Ok(entry_id) => {
                debug!(
                    message_id,
                    entry_id,
                    stage = %PipelineStage::indexed(role),
                    "Message indexed"
                );
                IndexOutcome::Indexed { entry_id }
            }
            Err(e) => self.degraded(message_id, PipelineStage::indexed(role), e),
        }
    }

    fn degraded(&self, message_id: MessageId, stage: PipelineStage, error: HavenError) -> IndexOutcome {
        warn!(
            message_id,
            stage = %stage,
            degradable = error.is_degradable(),
            error = %error,
            "Message stored without vector index"
        );
        IndexOutcome::Degraded {
            stage,
            reason: error.to_string(),
        }
    }
}
