use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::GenerationError;
use crate::models::ChatRequest;
use crate::traits::{ChatBackend, FragmentStream};

pub struct OllamaChat {
    client: Client,
    endpoint: Url,
}

impl OllamaChat {
    pub fn new(host: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: Client::new(),
            endpoint: host.join("api/chat")?,
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaChat {
    async fn open_stream(&self, request: &ChatRequest) -> Result<FragmentStream, GenerationError> {
        info!(model = %request.model, "calling ollama chat model");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes_stream().boxed();
        Ok(fragments(body))
    }
}

type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

struct FragmentState {
    body: ByteStream,
    decoder: LineDecoder,
    pending: VecDeque<Result<String, GenerationError>>,
    exhausted: bool,
}

fn fragments(body: ByteStream) -> FragmentStream {
    let state = FragmentState {
        body,
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.exhausted {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let decoded = state.decoder.push(&bytes);
                    state.pending.extend(decoded);
                }
                Some(Err(error)) => {
                    state.exhausted = true;
                    state.pending.push_back(Err(error.into()));
                }
                None => {
                    state.exhausted = true;
                    let decoded = state.decoder.finish();
                    state.pending.extend(decoded);
                }
            }
        }
    })
    .boxed()
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<ChatLineMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatLineMessage {
    #[serde(default)]
    content: String,
}

/// Reassembles NDJSON lines split across body chunks.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, GenerationError>> {
        self.buffer.extend_from_slice(bytes);

        let mut decoded = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(item) = decode_line(&line) {
                decoded.push(item);
            }
        }
        decoded
    }

    pub fn finish(&mut self) -> Vec<Result<String, GenerationError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<String, GenerationError>> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let parsed: ChatLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(_) => return Some(Err(GenerationError::MalformedLine(line.to_string()))),
    };

    if let Some(error) = parsed.error {
        return Some(Err(GenerationError::Backend(error)));
    }

    parsed
        .message
        .map(|message| message.content)
        .filter(|content| !content.is_empty())
        .map(Ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: Vec<Result<String, GenerationError>>) -> Vec<String> {
        items
            .into_iter()
            .map(|item| item.expect("fragment should decode"))
            .collect()
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut decoder = LineDecoder::default();
        let first = decoder.push(b"{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"message\":{\"con");
        let second = decoder.push(b"tent\":\"lo\"},\"done\":false}\n");

        assert_eq!(texts(first), vec!["Hel".to_string()]);
        assert_eq!(texts(second), vec!["lo".to_string()]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn done_line_with_empty_content_is_skipped() {
        let mut decoder = LineDecoder::default();
        let decoded = decoder.push(
            b"{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"total_duration\":1}\n",
        );
        assert!(decoded.is_empty());
    }

    #[test]
    fn error_lines_become_backend_errors() {
        let mut decoder = LineDecoder::default();
        let decoded = decoder.push(b"{\"error\":\"model 'x' not found\"}\n");
        assert!(matches!(
            decoded.as_slice(),
            [Err(GenerationError::Backend(message))] if message.contains("not found")
        ));
    }

    #[test]
    fn garbage_is_reported_as_malformed() {
        let mut decoder = LineDecoder::default();
        let decoded = decoder.push(b"<html>bad gateway</html>\n");
        assert!(matches!(
            decoded.as_slice(),
            [Err(GenerationError::MalformedLine(_))]
        ));
    }

    #[test]
    fn unterminated_final_line_is_flushed() {
        let mut decoder = LineDecoder::default();
        assert!(decoder
            .push(b"{\"message\":{\"content\":\"tail\"}}")
            .is_empty());
        assert_eq!(texts(decoder.finish()), vec!["tail".to_string()]);
    }

    #[test]
    fn multibyte_characters_split_across_chunks_survive() {
        let line = "{\"message\":{\"content\":\"caf\u{e9} \u{26a0}\"}}\n".as_bytes();
        let (head, tail) = line.split_at(line.len() - 6);
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(head).is_empty());
        assert_eq!(texts(decoder.push(tail)), vec!["caf\u{e9} \u{26a0}".to_string()]);
    }

    #[tokio::test]
    async fn body_stream_is_decoded_into_fragments() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"{\"message\":{\"content\":\"The \"}}\n{\"mess")),
            Ok(Bytes::from_static(
                b"age\":{\"content\":\"answer\"}}\n{\"message\":{\"content\":\"\"},\"done\":true}\n",
            )),
        ];
        let body: ByteStream = stream::iter(chunks).boxed();

        let collected: Vec<String> = fragments(body)
            .map(|item| item.expect("fragment decodes"))
            .collect()
            .await;
        assert_eq!(collected, vec!["The ".to_string(), "answer".to_string()]);
    }
}
