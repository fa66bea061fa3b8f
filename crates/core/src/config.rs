use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::chunking::ChunkingConfig;
use crate::error::ChatError;
use crate::prompts::PromptSet;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gemma2-9b-it";
pub const DEFAULT_SESSION_ID: &str = "default_session";
pub const DEFAULT_TOP_K: usize = 4;

/// Provider API key. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Accepts any non-blank key; blank or absent input is a missing credential.
    pub fn parse(raw: Option<&str>) -> Result<Self, ChatError> {
        match raw.map(str::trim) {
            Some(key) if !key.is_empty() => Ok(Self(key.to_string())),
            _ => Err(ChatError::MissingCredential),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(****)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub http_timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: GROQ_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            http_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingConfig {
    Hashed {
        dimensions: usize,
        normalize: bool,
    },
    Http {
        base_url: String,
        model: String,
        dimensions: usize,
        batch_size: usize,
    },
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::Hashed {
            dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
            normalize: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexConfig {
    #[default]
    Memory,
    Qdrant { url: String, collection: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub prompts: PromptSet,
    pub request_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ChatError> {
        self.chunking
            .validate()
            .map_err(|error| ChatError::Config(error.to_string()))?;
        self.prompts.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(ChatError::Config("top_k must be positive".to_string()));
        }
        if let EmbeddingConfig::Http { batch_size: 0, .. } = self.embedding {
            return Err(ChatError::Config("embedding batch_size must be positive".to_string()));
        }
        url::Url::parse(&self.provider.base_url)
            .map_err(|error| ChatError::Config(format!("provider base_url: {error}")))?;
        Ok(())
    }
}
