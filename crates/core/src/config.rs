use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::chunking::SplitterConfig;
use crate::error::ConfigError;

pub const DEFAULT_MODEL_ID: &str = "deepseek-r1:8b";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_PERSIST_DIR: &str = "./chroma_db";
pub const DEFAULT_LOG_FILE: &str = "chatbot_logs.log";
pub const DEFAULT_PAGE_TITLE: &str = "PDF Q&A Chatbot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Ollama,
    Hashing,
}

impl EmbeddingProvider {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            _ => Err(ConfigError::UnknownProvider(value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub model_id: String,
    pub embed_model_id: String,
    pub ollama_host: Url,
    pub embedding_provider: EmbeddingProvider,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub request_timeout: Duration,
    pub persist_dir: PathBuf,
    pub log_file: PathBuf,
    pub page_title: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key).and_then(|value| {
                let value = value.trim().to_string();
                if value.is_empty() {
                    None
                } else {
                    Some(value)
                }
            })
        };

        let model_id = read("OLLAMA_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
        let embed_model_id = read("OLLAMA_EMBED_MODEL_ID").unwrap_or_else(|| model_id.clone());

        let host = read("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
        let ollama_host = parse_host(&host)?;

        let embedding_provider = match read("EMBEDDING_PROVIDER") {
            Some(value) => EmbeddingProvider::parse(&value)?,
            None => EmbeddingProvider::Ollama,
        };

        let chunk_size = parse_number("CHUNK_SIZE", read("CHUNK_SIZE"), DEFAULT_CHUNK_SIZE)?;
        let chunk_overlap =
            parse_number("CHUNK_OVERLAP", read("CHUNK_OVERLAP"), DEFAULT_CHUNK_OVERLAP)?;
        let top_k = parse_number("RETRIEVAL_TOP_K", read("RETRIEVAL_TOP_K"), DEFAULT_TOP_K)?;
        let timeout_secs = parse_number(
            "REQUEST_TIMEOUT_SECS",
            read("REQUEST_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS as usize,
        )?;

        let settings = Self {
            model_id,
            embed_model_id,
            ollama_host,
            embedding_provider,
            chunk_size,
            chunk_overlap,
            top_k,
            request_timeout: Duration::from_secs(timeout_secs as u64),
            persist_dir: read("CHROMA_PERSIST_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PERSIST_DIR)),
            log_file: read("LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            page_title: read("PAGE_TITLE").unwrap_or_else(|| DEFAULT_PAGE_TITLE.to_string()),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero { key: "CHUNK_SIZE" });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::Zero {
                key: "RETRIEVAL_TOP_K",
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Zero {
                key: "REQUEST_TIMEOUT_SECS",
            });
        }
        Ok(())
    }

    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

fn parse_number(key: &'static str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match raw {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}

fn parse_host(raw: &str) -> Result<Url, ConfigError> {
    // Url::join drops the last path segment unless the base ends with a slash.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|source| ConfigError::InvalidUrl {
        key: "OLLAMA_HOST",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let settings = settings_from(&[]).expect("defaults are valid");
        assert_eq!(settings.model_id, DEFAULT_MODEL_ID);
        assert_eq!(settings.embed_model_id, DEFAULT_MODEL_ID);
        assert_eq!(settings.chunk_size, 500);
        assert_eq!(settings.chunk_overlap, 100);
        assert_eq!(settings.top_k, 4);
        assert_eq!(settings.persist_dir, PathBuf::from("./chroma_db"));
        assert_eq!(settings.page_title, "PDF Q&A Chatbot");
        assert_eq!(settings.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(settings.ollama_host.as_str(), "http://localhost:11434/");
    }

    #[test]
    fn overrides_are_read_and_blank_values_ignored() {
        let settings = settings_from(&[
            ("OLLAMA_MODEL_ID", "llama3.2"),
            ("CHUNK_SIZE", "800"),
            ("CHUNK_OVERLAP", "  "),
            ("EMBEDDING_PROVIDER", "Hashing"),
            ("OLLAMA_HOST", "http://gpu-box:11434/ollama"),
        ])
        .expect("valid overrides");
        assert_eq!(settings.model_id, "llama3.2");
        assert_eq!(settings.embed_model_id, "llama3.2");
        assert_eq!(settings.chunk_size, 800);
        assert_eq!(settings.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(settings.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(
            settings.ollama_host.join("api/chat").map(String::from).ok(),
            Some("http://gpu-box:11434/ollama/api/chat".to_string())
        );
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let result = settings_from(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidChunking {
                size: 100,
                overlap: 100
            })
        ));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let result = settings_from(&[("CHUNK_SIZE", "five hundred")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber {
                key: "CHUNK_SIZE",
                ..
            })
        ));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = settings_from(&[("EMBEDDING_PROVIDER", "chroma")]);
        assert!(matches!(result, Err(ConfigError::UnknownProvider(_))));
    }
}
