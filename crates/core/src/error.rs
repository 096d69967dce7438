use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::interrupt::Interrupted;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },

    #[error("invalid chunking config: overlap {overlap} must be smaller than chunk size {size}")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("invalid url for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("unknown embedding provider {0:?} (expected \"ollama\" or \"hashing\")")]
    UnknownProvider(String),
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("pdf input is empty")]
    EmptyInput,

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf had no readable page text")]
    NoText,

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("pdf worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding count {got} doesn't match input count {expected}")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding for input {0} is empty")]
    EmptyVector(usize),
}

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vector store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no chunks to index")]
    NothingToIndex,

    #[error("indexing timed out after {0:?}")]
    Timeout(Duration),

    #[error("indexing was cancelled")]
    Cancelled,
}

impl From<Interrupted> for IndexingError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::TimedOut(limit) => IndexingError::Timeout(limit),
            Interrupted::Cancelled => IndexingError::Cancelled,
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("retrieval timed out after {0:?}")]
    Timeout(Duration),

    #[error("retrieval was cancelled")]
    Cancelled,
}

impl From<Interrupted> for SearchError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::TimedOut(limit) => SearchError::Timeout(limit),
            Interrupted::Cancelled => SearchError::Cancelled,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat backend returned {status}: {body}")]
    BackendStatus { status: u16, body: String },

    #[error("chat backend error: {0}")]
    Backend(String),

    #[error("malformed stream line: {0}")]
    MalformedLine(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation was cancelled")]
    Cancelled,
}

impl From<Interrupted> for GenerationError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::TimedOut(limit) => GenerationError::Timeout(limit),
            Interrupted::Cancelled => GenerationError::Cancelled,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no index available: upload and process a PDF first")]
    NoIndex,

    #[error("question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error(transparent)]
    Retrieval(#[from] SearchError),
}

pub type Result<T, E = IngestionError> = std::result::Result<T, E>;
