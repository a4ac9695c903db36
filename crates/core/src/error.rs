//! Error types for the parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the session layer wraps
//! them into a single turn-level error.

use thiserror::Error;

/// Errors from the completion / embedding service.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Errors raised while pulling fragments out of a registered source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Source '{source_name}' failed: {reason}")]
    Fetch { source_name: String, reason: String },

    #[error("Embedding request failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("Embedding count mismatch: sent {expected} inputs, got {actual} vectors")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("Embedding for '{identifier}' has {actual} dimensions, the prompt's has {expected}")]
    EmbeddingDimension {
        identifier: String,
        expected: usize,
        actual: usize,
    },
}

impl SourceError {
    /// Convenience constructor for provider implementations.
    pub fn fetch(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Tokenizer failures. These indicate a broken tokenizer or a programming
/// error, not a recoverable session condition.
#[derive(Debug, Clone, Error)]
pub enum TokenizerError {
    #[error("Failed to encode text: {0}")]
    Encode(String),

    #[error("Chunk size must be at least one token")]
    InvalidChunkSize,

    #[error("Failed to load tokenizer: {0}")]
    Load(String),
}
