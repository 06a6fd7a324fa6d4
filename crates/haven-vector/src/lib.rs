//! Haven Vector crate - embedding generators and the IVF vector store.
//!
//! Provides the embedding service trait with a random placeholder and a
//! deterministic hash-based generator, typed collection schemas with scalar
//! fields, and an in-process inverted-file index searched by L2 or cosine
//! distance.

pub mod collection;
pub mod embedding;
pub mod ivf;
pub mod store;

pub use collection::{CollectionSchema, ScalarField, ScalarFields, ScalarKind, ScalarValue};
pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding, RandomEmbedding};
pub use ivf::IvfParams;
pub use store::{EntryId, IvfVectorStore, SearchHit, VectorStore};
