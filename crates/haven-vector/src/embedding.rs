//! Embedding service trait and implementations.
//!
//! - `RandomEmbedding` draws uniform random vectors. It is the placeholder
//!   generator wired in until a real text-embedding model is available, and
//!   is intentionally non-deterministic.
//! - `HashEmbedding` derives deterministic unit vectors from a hash of the
//!   input text, so identical inputs always produce identical outputs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::Rng;

use haven_core::error::HavenError;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. Used both
/// when indexing new messages and when embedding a search query.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, HavenError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Arc<dyn DynEmbeddingService>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, HavenError>> + Send + 'a>>;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, HavenError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

fn reject_empty(text: &str) -> Result<(), HavenError> {
    if text.trim().is_empty() {
        return Err(HavenError::Embedding("Cannot embed empty text".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RandomEmbedding - placeholder generator
// ---------------------------------------------------------------------------

/// Placeholder embedding service returning uniform `[0, 1)` vectors.
///
/// The output carries no meaning and differs on every call. Swap in a real
/// model through [`EmbeddingService`] before relying on similarity results.
#[derive(Debug, Clone)]
pub struct RandomEmbedding {
    dimensions: usize,
}

impl RandomEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn sample(&self) -> Vec<f32> {
        let mut rng = rand::rng();
        (0..self.dimensions).map(|_| rng.random::<f32>()).collect()
    }
}

impl Default for RandomEmbedding {
    fn default() -> Self {
        Self::new(1536)
    }
}

impl EmbeddingService for RandomEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HavenError> {
        reject_empty(text)?;
        Ok(self.sample())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// HashEmbedding - deterministic hash-based vectors
// ---------------------------------------------------------------------------

/// Deterministic embedding service derived from a hash of the input text.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        // L2-normalize so distances stay within [0, 2].
        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(1536)
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HavenError> {
        reject_empty(text)?;
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_random_embedding_dimension() {
        let service = RandomEmbedding::default();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 1536);
        assert_eq!(EmbeddingService::dimensions(&service), 1536);
    }

    #[tokio::test]
    async fn test_random_embedding_values_in_unit_interval() {
        let service = RandomEmbedding::new(64);
        let vec = service.embed("mood check").await.unwrap();
        assert!(vec.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_random_embedding_rejects_empty_text() {
        let service = RandomEmbedding::new(8);
        let err = service.embed("  ").await.unwrap_err();
        assert!(matches!(err, HavenError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_hash_embedding_deterministic() {
        let service = HashEmbedding::new(384);
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 384);
    }

    #[tokio::test]
    async fn test_hash_embedding_different_inputs() {
        let service = HashEmbedding::new(64);
        let v1 = service.embed("text one").await.unwrap();
        let v2 = service.embed("text two").await.unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn test_hash_embedding_is_unit_length() {
        let service = HashEmbedding::new(128);
        let vec = service.embed("normalize me").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_hash_embedding_rejects_empty_text() {
        let service = HashEmbedding::new(8);
        assert!(service.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_dyn_dispatch() {
        let service: Box<dyn DynEmbeddingService> = Box::new(HashEmbedding::new(16));
        let vec = service.embed_boxed("boxed").await.unwrap();
        assert_eq!(vec.len(), 16);
        assert_eq!(service.dimensions(), 16);
    }
}
