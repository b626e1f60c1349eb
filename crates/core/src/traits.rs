use crate::{IndexedVector, QueryError, ScoredVector};
use async_trait::async_trait;

/// A persisted vector index addressed as a whole.
///
/// Callers only create, fill, destroy and query it; the on-disk or remote
/// layout is the implementation's business.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn exists(&self) -> Result<bool, QueryError>;

    async fn destroy(&self) -> Result<(), QueryError>;

    async fn create(&self, dimensions: usize, embedding_model: &str) -> Result<(), QueryError>;

    async fn upsert(&self, vectors: &[IndexedVector]) -> Result<(), QueryError>;

    /// Embedding model the index was built with, when the backend records it.
    async fn embedding_model(&self) -> Result<Option<String>, QueryError> {
        Ok(None)
    }

    /// Up to `limit` entries, most similar first, with their stored embeddings.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredVector>, QueryError>;
}
