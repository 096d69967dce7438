pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod indexer;
pub mod ingest;
pub mod interrupt;
pub mod models;
pub mod ollama;
pub mod pipeline;
pub mod prompt;
pub mod reasoning;
pub mod session;
pub mod store;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{RecursiveSplitter, SplitterConfig};
pub use config::{EmbeddingProvider, Settings};
pub use embeddings::{Embedder, HashingEmbedder, OllamaEmbedder};
pub use error::{
    ConfigError, EmbeddingError, GenerationError, IndexingError, IngestionError, PipelineError,
    SearchError,
};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use generator::{Answer, AnswerGenerator, AnswerStream, StreamEvent, ERROR_SENTINEL};
pub use indexer::{Indexer, Retriever};
pub use ingest::{document_fingerprint, Ingestor};
pub use models::{ChatMessage, ChatRole, Chunk, IndexedChunk, ScoredChunk};
pub use ollama::OllamaChat;
pub use pipeline::{Assistant, UploadSummary};
pub use reasoning::{strip_reasoning, ReasoningFilter};
pub use session::Session;
pub use store::LocalVectorStore;
pub use traits::{ChatBackend, VectorIndex};
