use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::GenerationError;
use crate::interrupt::bounded;
use crate::models::ChatRequest;
use crate::prompt::chat_request;
use crate::reasoning::strip_reasoning;
use crate::traits::{ChatBackend, FragmentStream};

/// Shown in place of an answer when the backend fails before producing any text.
pub const ERROR_SENTINEL: &str = "⚠️ Error generating response.";

#[derive(Clone)]
pub struct AnswerGenerator {
    backend: Arc<dyn ChatBackend>,
    model: String,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Prepares a lazy answer stream; nothing is sent until the first pull.
    pub fn stream(&self, question: &str, context: &str, cancel: CancellationToken) -> AnswerStream {
        AnswerStream {
            backend: Arc::clone(&self.backend),
            request: chat_request(&self.model, question, context),
            timeout: self.timeout,
            cancel,
            fragments: None,
            finished: false,
            raw: String::new(),
            produced_token: false,
            failure: None,
        }
    }
}

#[derive(Debug)]
pub enum StreamEvent {
    Token(String),
    /// Rendered as [`ERROR_SENTINEL`].
    Failed(GenerationError),
    /// Failure after some text; nothing is rendered for it.
    Truncated(GenerationError),
}

impl StreamEvent {
    pub fn render_text(&self) -> Option<&str> {
        match self {
            StreamEvent::Token(text) => Some(text.as_str()),
            StreamEvent::Failed(_) => Some(ERROR_SENTINEL),
            StreamEvent::Truncated(_) => None,
        }
    }
}

/// The backend connection is released when the stream ends, fails or is dropped.
pub struct AnswerStream {
    backend: Arc<dyn ChatBackend>,
    request: ChatRequest,
    timeout: Duration,
    cancel: CancellationToken,
    fragments: Option<FragmentStream>,
    finished: bool,
    raw: String,
    produced_token: bool,
    failure: Option<String>,
}

enum Pull {
    Fragment(String),
    Failed(GenerationError),
    Exhausted,
}

impl AnswerStream {
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        loop {
            match self.pull().await {
                Pull::Fragment(text) if text.is_empty() => continue,
                Pull::Fragment(text) => {
                    self.raw.push_str(&text);
                    self.produced_token = true;
                    return Some(StreamEvent::Token(text));
                }
                Pull::Failed(reason) => return Some(self.fail(reason)),
                Pull::Exhausted => {
                    self.close();
                    return None;
                }
            }
        }
    }

    /// Ends the stream and returns the assembled answer. Pending fragments are
    /// not drained; call after `next_event` returned `None` for the full text.
    pub fn finish(mut self) -> Answer {
        self.close();
        Answer {
            cleaned: strip_reasoning(&self.raw),
            raw: std::mem::take(&mut self.raw),
            produced_token: self.produced_token,
            failure: self.failure.take(),
        }
    }

    async fn pull(&mut self) -> Pull {
        if self.fragments.is_none() {
            let opened = bounded(
                self.backend.open_stream(&self.request),
                self.timeout,
                &self.cancel,
            )
            .await;
            match opened {
                Ok(Ok(stream)) => self.fragments = Some(stream),
                Ok(Err(reason)) => return Pull::Failed(reason),
                Err(interrupted) => return Pull::Failed(interrupted.into()),
            }
        }

        let Some(fragments) = self.fragments.as_mut() else {
            return Pull::Exhausted;
        };

        match bounded(fragments.next(), self.timeout, &self.cancel).await {
            Ok(Some(Ok(text))) => Pull::Fragment(text),
            Ok(Some(Err(reason))) => Pull::Failed(reason),
            Ok(None) => Pull::Exhausted,
            Err(interrupted) => Pull::Failed(interrupted.into()),
        }
    }

    fn fail(&mut self, reason: GenerationError) -> StreamEvent {
        self.failure = Some(reason.to_string());
        self.close();
        if self.produced_token {
            warn!(error = %reason, received = self.raw.len(), "answer stream truncated");
            StreamEvent::Truncated(reason)
        } else {
            error!(error = %reason, "answer stream failed before first token");
            StreamEvent::Failed(reason)
        }
    }

    fn close(&mut self) {
        self.finished = true;
        self.fragments = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub raw: String,
    pub cleaned: String,
    pub produced_token: bool,
    pub failure: Option<String>,
}

impl Answer {
    pub fn stored_text(&self) -> &str {
        if self.failure.is_some() && !self.produced_token {
            ERROR_SENTINEL
        } else {
            &self.cleaned
        }
    }
}
