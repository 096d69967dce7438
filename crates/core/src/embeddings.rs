use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

pub const HASHING_DIMENSIONS: usize = 256;

/// Texts sent to the embedding backend per request.
pub const EMBED_BATCH_SIZE: usize = 32;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// Embeds `texts`, returning one vector per input in the same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(host: &Url, model: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: Client::new(),
            endpoint: host.join("api/embed")?,
            model: model.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch = texts.len(), "requesting embeddings");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: OllamaEmbedResponse = response.json().await?;
        check_vectors(texts.len(), parsed.embeddings)
    }
}

fn check_vectors(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            got: vectors.len(),
        });
    }
    if let Some(position) = vectors.iter().position(Vec::is_empty) {
        return Err(EmbeddingError::EmptyVector(position));
    }
    Ok(vectors)
}

/// Offline embedder hashing character trigrams and words into a fixed
/// number of buckets. Deterministic and L2-normalised.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: HASHING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();

        for word in lowered.split(|ch: char| !ch.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                let slot = bucket(&gram, vector.len());
                vector[slot] += 1.0;
            }
            let slot = bucket(word, vector.len());
            vector[slot] += 2.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

fn bucket(token: &str, buckets: usize) -> usize {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % buckets as u64) as usize
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-trigram"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Little-endian `f32` bytes, as stored in the vector index.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed_one("Hydraulic pressure and flow");
        let second = embedder.embed_one("Hydraulic pressure and flow");
        assert_eq!(first, second);
        assert_eq!(first.len(), HASHING_DIMENSIONS);
    }

    #[test]
    fn related_text_scores_higher_than_unrelated_text() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_one("hydraulic pump pressure");
        let related = embedder.embed_one("The hydraulic pump raises pressure in the line.");
        let unrelated = embedder.embed_one("Quarterly revenue grew in the northern region.");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn blobs_decode_to_the_stored_vector() {
        let vector = vec![0.25, -1.5, f32::MIN_POSITIVE];
        let blob = vec_to_blob(&vector);
        assert_eq!(blob.len(), 12);
        assert_eq!(blob_to_vec(&blob), vector);
    }

    #[test]
    fn vector_count_and_emptiness_are_checked() {
        assert!(matches!(
            check_vectors(2, vec![vec![1.0]]),
            Err(EmbeddingError::CountMismatch {
                expected: 2,
                got: 1
            })
        ));
        assert!(matches!(
            check_vectors(2, vec![vec![1.0], vec![]]),
            Err(EmbeddingError::EmptyVector(1))
        ));
        assert!(check_vectors(1, vec![vec![0.5]]).is_ok());
    }

    #[test]
    fn ollama_endpoint_is_joined_onto_host() {
        let host = Url::parse("http://localhost:11434/").expect("valid url");
        let embedder = OllamaEmbedder::new(&host, "nomic-embed-text").expect("valid endpoint");
        assert_eq!(embedder.endpoint.as_str(), "http://localhost:11434/api/embed");
        assert_eq!(embedder.model_name(), "nomic-embed-text");
    }
}
