//! Shared test helpers: scripted collaborators and a word tokenizer.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parley_core::error::{ProviderError, SourceError, TokenizerError};
use parley_core::fragment::TextFragment;
use parley_core::message::Message;
use parley_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use parley_core::source::SourceProvider;
use parley_core::tokenizer::TokenCounter;

/// One token per whitespace-separated word; leading whitespace belongs to
/// the word that follows it.
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn name(&self) -> &str {
        "words"
    }

    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>, TokenizerError> {
        let mut spans = Vec::new();
        let mut start = 0;
        let mut in_word = false;
        for (i, c) in text.char_indices() {
            if c.is_whitespace() && in_word {
                spans.push(start..i);
                start = i;
                in_word = false;
            } else if !c.is_whitespace() {
                in_word = true;
            }
        }
        if in_word {
            spans.push(start..text.len());
        }
        Ok(spans)
    }
}

/// A string of exactly `n` word tokens.
pub fn words(n: usize) -> String {
    vec!["w"; n].join(" ")
}

/// Completion and embedding provider driven by a script.
///
/// Replies are returned in order; once the script runs out the provider
/// answers `"ok"`. Embeddings are looked up by (normalized) input text and
/// unknown inputs get an empty vector, which relevance selection rejects.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    embeddings: HashMap<String, Vec<f32>>,
    fail_embeddings: bool,
    short_batches: bool,
    requests: Mutex<Vec<ProviderRequest>>,
    embedding_requests: Mutex<Vec<EmbeddingRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(replies: &[&str]) -> Self {
        let provider = Self::new();
        *provider.replies.lock().unwrap() = replies.iter().map(|r| Ok(r.to_string())).collect();
        provider
    }

    pub fn failing_completion() -> Self {
        let provider = Self::new();
        *provider.replies.lock().unwrap() = vec![Err(ProviderError::ApiError {
            status_code: 500,
            message: "internal error".into(),
        })];
        provider
    }

    pub fn with_embedding(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.embeddings.insert(text.to_string(), vector);
        self
    }

    pub fn with_failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    /// Return one vector fewer than requested.
    pub fn with_short_embedding_batches(mut self) -> Self {
        self.short_batches = true;
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn embedding_requests(&self) -> Vec<EmbeddingRequest> {
        self.embedding_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);

        let next = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok("ok".to_string())
            } else {
                replies.remove(0)
            }
        };

        next.map(|text| ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 1,
                total_tokens: 11,
            }),
            model,
            metadata: serde_json::Map::new(),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.embedding_requests.lock().unwrap().push(request.clone());

        if self.fail_embeddings {
            return Err(ProviderError::Network("embedding service down".into()));
        }

        let mut embeddings: Vec<Vec<f32>> = request
            .inputs
            .iter()
            .map(|input| self.embeddings.get(input).cloned().unwrap_or_default())
            .collect();
        if self.short_batches {
            embeddings.pop();
        }

        Ok(EmbeddingResponse {
            embeddings,
            model: request.model,
            usage: None,
        })
    }
}

/// A source returning fixed fragments and counting how often it was asked.
pub struct StaticSource {
    name: String,
    fragments: Vec<TextFragment>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &str, fragments: Vec<TextFragment>) -> Self {
        Self {
            name: name.to_string(),
            fragments,
            calls: AtomicUsize::new(0),
        }
    }

    /// One fragment per text, identified as `{name}-{i}`.
    pub fn texts(name: &str, texts: &[String]) -> Self {
        let fragments = texts
            .iter()
            .enumerate()
            .map(|(i, t)| TextFragment::new(format!("{name}-{i}"), t.clone()))
            .collect();
        Self::new(name, fragments)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _prompt: &str) -> Result<Vec<TextFragment>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fragments.clone())
    }
}

/// A source that always fails.
pub struct FailingSource;

#[async_trait]
impl SourceProvider for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch(&self, _prompt: &str) -> Result<Vec<TextFragment>, SourceError> {
        Err(SourceError::fetch("failing", "backend unavailable"))
    }
}
