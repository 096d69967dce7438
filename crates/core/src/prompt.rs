use crate::models::{ChatMessage, ChatRequest, ScoredChunk};

pub const SYSTEM_PROMPT: &str = "You are an AI assistant specialized in answering questions concisely. \
Provide clear and direct responses in two or three sentences, keeping answers as brief as possible \
while maintaining accuracy.";

/// Joins retrieved passages with a blank line, keeping rank order.
pub fn build_context(passages: &[ScoredChunk]) -> String {
    passages
        .iter()
        .map(|passage| passage.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn user_turn(question: &str, context: &str) -> String {
    format!("Question: {question}\n\nContext: {context}")
}

pub fn chat_request(model: &str, question: &str, context: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_turn(question, context)),
        ],
        stream: true,
    }
}
