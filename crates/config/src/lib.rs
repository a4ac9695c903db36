//! Configuration loading, validation, and management for parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion / embedding service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Instruction inserted into the default system preamble
    #[serde(default)]
    pub instruction: String,

    /// Per-session budget and model settings
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("instruction", &self.instruction)
            .field("session", &self.session)
            .finish()
    }
}

/// Budget split and request parameters for one conversation session.
///
/// A forked session starts from a copy of its parent's config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Token ceiling for the whole request (preamble + context + history + reply)
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,

    /// Tokens reserved for the model's reply
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,

    /// Ceiling for preamble + history before oldest turns are dropped
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: usize,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature, 0.0..=2.0
    #[serde(default)]
    pub temperature: f32,

    /// End-user identifier forwarded to the API
    #[serde(default)]
    pub user_id: String,

    /// Rank sources by embedding similarity instead of weight alone
    #[serde(default)]
    pub use_embeddings: bool,

    /// Minimum `similarity * weight` for a fragment to be considered, 0.0..=1.0
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Embedding model used when `use_embeddings` is on
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Split fragments lacking embeddings into pieces of this many tokens
    /// before embedding them (0 = never split)
    #[serde(default)]
    pub embedding_chunk_tokens: usize,
}

fn default_max_total_tokens() -> usize {
    4000
}
fn default_max_response_tokens() -> usize {
    300
}
fn default_max_history_tokens() -> usize {
    1000
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_total_tokens: default_max_total_tokens(),
            max_response_tokens: default_max_response_tokens(),
            max_history_tokens: default_max_history_tokens(),
            model: default_model(),
            temperature: 0.0,
            user_id: String::new(),
            use_embeddings: false,
            similarity_threshold: default_similarity_threshold(),
            embedding_model: default_embedding_model(),
            embedding_chunk_tokens: 0,
        }
    }
}

impl SessionConfig {
    pub fn with_max_total_tokens(mut self, tokens: usize) -> Self {
        self.max_total_tokens = tokens;
        self
    }

    pub fn with_max_response_tokens(mut self, tokens: usize) -> Self {
        self.max_response_tokens = tokens;
        self
    }

    pub fn with_max_history_tokens(mut self, tokens: usize) -> Self {
        self.max_history_tokens = tokens;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Turn relevance ranking on or off.
    pub fn with_embeddings(mut self, enabled: bool) -> Self {
        self.use_embeddings = enabled;
        self
    }

    /// Only used when embeddings are on.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_embedding_chunk_tokens(mut self, tokens: usize) -> Self {
        self.embedding_chunk_tokens = tokens;
        self
    }

    /// Validate ranges and the budget split.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.max_response_tokens > self.max_total_tokens {
            return Err(ConfigError::ValidationError(format!(
                "max_response_tokens ({}) exceeds max_total_tokens ({})",
                self.max_response_tokens, self.max_total_tokens
            )));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from the default path, with env var overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // API key resolution: config file → env vars
        if config.api_key.is_none() {
            config.api_key = std::env::var("PARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("PARLEY_API_URL") {
            config.api_url = url;
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            config.session.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("api_url must not be empty".into()));
        }
        self.session.validate()
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            instruction: String::new(),
            session: SessionConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
