use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::embeddings::{Embedder, EMBED_BATCH_SIZE};
use crate::error::{IndexingError, SearchError};
use crate::interrupt::bounded;
use crate::models::{Chunk, IndexedChunk, ScoredChunk};
use crate::store::LocalVectorStore;
use crate::traits::VectorIndex;

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    persist_dir: PathBuf,
    top_k: usize,
    timeout: Duration,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        persist_dir: impl Into<PathBuf>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            persist_dir: persist_dir.into(),
            top_k,
            timeout,
        }
    }

    pub async fn build(
        &self,
        chunks: &[Chunk],
        document_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Retriever, IndexingError> {
        if chunks.is_empty() {
            return Err(IndexingError::NothingToIndex);
        }

        let store = LocalVectorStore::open(&self.persist_dir).await?;

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = bounded(self.embedder.embed_batch(&texts), self.timeout, cancel).await??;
            if vectors.len() != texts.len() {
                return Err(crate::error::EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    got: vectors.len(),
                }
                .into());
            }
            embeddings.extend(vectors);
        }

        let ingested_at = Utc::now();
        let model = self.embedder.model_name().to_string();
        let records = chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk {
                id: Uuid::new_v4(),
                document_id: document_id.to_string(),
                model: model.clone(),
                ingested_at,
                chunk,
                embedding,
            })
            .collect();

        let written = store.add(records).await?;
        info!(
            path = %self.persist_dir.display(),
            written,
            total = store.len().await?,
            model = %model,
            "vector store initialized"
        );

        Ok(Retriever::new(
            Arc::clone(&self.embedder),
            Arc::new(store),
            self.top_k,
            self.timeout,
        ))
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            timeout,
        }
    }

    pub async fn query(&self, text: &str) -> Result<Vec<ScoredChunk>, SearchError> {
        self.query_with(text, &CancellationToken::new()).await
    }

    /// Returns at most `top_k` chunks ordered by non-increasing similarity.
    /// Order among equal scores follows the index and is not guaranteed.
    pub async fn query_with(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let input = [text.to_string()];
        let vectors = bounded(self.embedder.embed_batch(&input), self.timeout, cancel).await??;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or(crate::error::EmbeddingError::CountMismatch {
                expected: 1,
                got: 0,
            })?;

        bounded(self.index.search(&query_vector, self.top_k), self.timeout, cancel).await?
    }
}
