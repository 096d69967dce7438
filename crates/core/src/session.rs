use crate::generator::Answer;
use crate::indexer::Retriever;
use crate::models::{ChatMessage, ChatRole};

/// History is append-only; a new upload replaces only the retriever.
#[derive(Default)]
pub struct Session {
    retriever: Option<Retriever>,
    history: Vec<ChatMessage>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_index(&self) -> bool {
        self.retriever.is_some()
    }

    pub fn retriever(&self) -> Option<&Retriever> {
        self.retriever.as_ref()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub(crate) fn replace_retriever(&mut self, retriever: Retriever) {
        self.retriever = Some(retriever);
    }

    pub(crate) fn push_question(&mut self, question: &str) {
        self.history.push(ChatMessage::user(question));
    }

    pub fn record_answer(&mut self, answer: &Answer) {
        self.history.push(ChatMessage::assistant(answer.stored_text()));
    }

    pub fn turns(&self) -> usize {
        self.history
            .iter()
            .filter(|message| message.role == ChatRole::User)
            .count()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("has_index", &self.has_index())
            .field("history_len", &self.history.len())
            .finish()
    }
}
