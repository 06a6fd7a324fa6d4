//! Conversational core for Haven.
//!
//! Wires the message store, embedding service and vector store into the
//! retrieval pipeline that handles each chat turn.

pub mod pipeline;
pub mod responder;

pub use pipeline::{
    chat_collection_schema, ChatTurn, IndexOutcome, PipelineSettings, PipelineStage,
    RebuildReport, RetrievalPipeline, SimilarMessage,
};
pub use responder::{PlaceholderResponder, Responder};
