use crate::error::{GenerationError, IndexingError, SearchError};
use crate::models::{ChatRequest, IndexedChunk, ScoredChunk};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Incremental text fragments of one chat completion.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Appends records, returning how many were written.
    async fn add(&self, records: Vec<IndexedChunk>) -> Result<usize, IndexingError>;

    /// Top `top_k` records by cosine similarity, best first.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError>;
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Starts a streaming completion. Dropping the returned stream releases the connection.
    async fn open_stream(&self, request: &ChatRequest) -> Result<FragmentStream, GenerationError>;
}
