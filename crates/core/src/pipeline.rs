use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chunking::RecursiveSplitter;
use crate::config::{EmbeddingProvider, Settings};
use crate::embeddings::{Embedder, HashingEmbedder, OllamaEmbedder};
use crate::error::{ConfigError, IngestionError, PipelineError};
use crate::extractor::LopdfExtractor;
use crate::generator::{Answer, AnswerGenerator, AnswerStream, StreamEvent};
use crate::indexer::Indexer;
use crate::ingest::{document_fingerprint, Ingestor};
use crate::ollama::OllamaChat;
use crate::prompt::build_context;
use crate::reasoning::ReasoningFilter;
use crate::session::Session;
use crate::traits::ChatBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub document_id: String,
    pub page_count: usize,
    pub chunk_count: usize,
}

pub struct Assistant {
    ingestor: Ingestor<LopdfExtractor>,
    indexer: Indexer,
    generator: AnswerGenerator,
}

impl Assistant {
    pub fn new(
        ingestor: Ingestor<LopdfExtractor>,
        indexer: Indexer,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            ingestor,
            indexer,
            generator,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let splitter = RecursiveSplitter::new(settings.splitter_config()).map_err(|_| {
            ConfigError::InvalidChunking {
                size: settings.chunk_size,
                overlap: settings.chunk_overlap,
            }
        })?;

        let invalid_host = |source| ConfigError::InvalidUrl {
            key: "OLLAMA_HOST",
            source,
        };
        let embedder: Arc<dyn Embedder> = match settings.embedding_provider {
            EmbeddingProvider::Ollama => Arc::new(
                OllamaEmbedder::new(&settings.ollama_host, settings.embed_model_id.clone())
                    .map_err(invalid_host)?,
            ),
            EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::default()),
        };
        let backend: Arc<dyn ChatBackend> =
            Arc::new(OllamaChat::new(&settings.ollama_host).map_err(invalid_host)?);

        Ok(Self::new(
            Ingestor::new(LopdfExtractor, splitter),
            Indexer::new(
                embedder,
                settings.persist_dir.clone(),
                settings.top_k,
                settings.request_timeout,
            ),
            AnswerGenerator::new(backend, settings.model_id.clone(), settings.request_timeout),
        ))
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// On error the session is left untouched.
    pub async fn upload(
        &self,
        session: &mut Session,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<UploadSummary, PipelineError> {
        let ingestor = self.ingestor.clone();
        let owned = bytes.to_vec();
        let chunks = tokio::task::spawn_blocking(move || ingestor.split(&owned))
            .await
            .map_err(|join| IngestionError::Worker(join.to_string()))?
            .inspect_err(|reason| error!(error = %reason, "pdf processing failed"))?;

        let document_id = document_fingerprint(bytes);
        let retriever = self
            .indexer
            .build(&chunks, &document_id, cancel)
            .await
            .inspect_err(|reason| error!(error = %reason, "indexing failed"))?;
        session.replace_retriever(retriever);

        let page_count = chunks
            .iter()
            .map(|chunk| chunk.source_page)
            .collect::<BTreeSet<_>>()
            .len();
        info!(
            document_id = %document_id,
            page_count,
            chunk_count = chunks.len(),
            "pdf processed"
        );

        Ok(UploadSummary {
            document_id,
            page_count,
            chunk_count: chunks.len(),
        })
    }

    /// The question enters history only once retrieval succeeds.
    pub async fn ask(
        &self,
        session: &mut Session,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<AnswerStream, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        let retriever = session.retriever().ok_or(PipelineError::NoIndex)?;

        info!(question = %question, "user query");
        let passages = retriever
            .query_with(question, &cancel)
            .await
            .inspect_err(|reason| error!(error = %reason, "retrieval failed"))?;
        info!(passages = passages.len(), "retrieved context");

        let context = build_context(&passages);
        session.push_question(question);
        Ok(self.generator.stream(question, &context, cancel))
    }

    pub async fn answer<F>(
        &self,
        session: &mut Session,
        question: &str,
        cancel: CancellationToken,
        mut render: F,
    ) -> Result<Answer, PipelineError>
    where
        F: FnMut(&str),
    {
        let mut stream = self.ask(session, question, cancel).await?;
        let mut filter = ReasoningFilter::default();
        let mut started = false;
        let mut show = |text: &str| {
            let text = if started { text } else { text.trim_start() };
            if !text.is_empty() {
                started = true;
                render(text);
            }
        };

        while let Some(event) = stream.next_event().await {
            match &event {
                StreamEvent::Token(text) => show(&filter.push(text)),
                StreamEvent::Failed(_) | StreamEvent::Truncated(_) => {
                    show(&filter.finish());
                    if let Some(text) = event.render_text() {
                        show(text);
                    }
                }
            }
        }
        show(&filter.finish());

        let answer = stream.finish();
        info!(response = %answer.stored_text(), "model response");
        session.record_answer(&answer);
        Ok(answer)
    }
}
