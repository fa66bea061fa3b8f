use std::time::Duration;
use thiserror::Error;

use crate::models::RequestPhase;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid document {file}: {reason}")]
    InvalidDocument { file: String, reason: String },

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IngestError {
    pub fn invalid_document(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidDocument {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {provider}: {details}")]
    Response { provider: String, details: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn response(provider: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Response {
            provider: provider.into(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key configured; enter a provider API key to continue")]
    MissingCredential,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("vector index {backend} failed: {details}")]
    Index { backend: String, details: String },

    #[error("no documents indexed yet; upload at least one PDF")]
    NoDocuments,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("{operation} timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },

    #[error("illegal request transition {from:?} -> {to:?}")]
    InvalidTransition { from: RequestPhase, to: RequestPhase },

    #[error("config error: {0}")]
    Config(String),
}

/// User-facing error classes shown by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidDocument,
    ProviderError,
    MissingCredential,
    Other,
}

impl ChatError {
    pub fn index(backend: impl Into<String>, details: impl ToString) -> Self {
        Self::Index {
            backend: backend.into(),
            details: details.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::MissingCredential => ErrorKind::MissingCredential,
            ChatError::Ingest(IngestError::InvalidDocument { .. }) => ErrorKind::InvalidDocument,
            ChatError::Provider(_) | ChatError::TimedOut { .. } | ChatError::Index { .. } => {
                ErrorKind::ProviderError
            }
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
