//! Source providers: where contextual information comes from.
//!
//! A source is asked for candidate fragments for a prompt. It may return
//! nothing, may attach precomputed embeddings, and may be called several
//! times for the same prompt within one session, so implementations should
//! be idempotent and must not mutate shared state.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::fragment::TextFragment;

/// A provider of fragments with metadata.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// A human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Candidate fragments for `prompt`, in the provider's preferred order.
    async fn fetch(&self, prompt: &str) -> Result<Vec<TextFragment>, SourceError>;
}

/// A simpler provider that only yields plain strings.
#[async_trait]
pub trait TextSource: Send + Sync {
    fn name(&self) -> &str;

    async fn texts(&self, prompt: &str) -> Result<Vec<String>, SourceError>;
}

/// Adapts a [`TextSource`] into a [`SourceProvider`]; embeddings are filled
/// in later by the selector when needed.
pub struct TextSourceAdapter<T> {
    inner: T,
}

impl<T: TextSource> TextSourceAdapter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: TextSource> SourceProvider for TextSourceAdapter<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, prompt: &str) -> Result<Vec<TextFragment>, SourceError> {
        let texts = self.inner.texts(prompt).await?;
        Ok(texts.into_iter().map(TextFragment::text).collect())
    }
}

/// A source that always yields the same single fragment.
#[derive(Debug, Clone)]
pub struct StaticText {
    name: String,
    fragment: TextFragment,
}

impl StaticText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            name: "static_text".into(),
            fragment: TextFragment::text(text),
        }
    }

    pub fn from_fragment(fragment: TextFragment) -> Self {
        let name = if fragment.identifier.is_empty() {
            "static_text".to_string()
        } else {
            fragment.identifier.clone()
        };
        Self { name, fragment }
    }
}

#[async_trait]
impl SourceProvider for StaticText {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _prompt: &str) -> Result<Vec<TextFragment>, SourceError> {
        Ok(vec![self.fragment.clone()])
    }
}
