//! Source registry: the ordered set of sources a session draws from.
//!
//! Sources are kept sorted by descending weight after every registration.
//! Equal weights keep registration order (each source carries a sequence
//! number used as the secondary key).

use std::sync::Arc;

use parley_core::source::{SourceProvider, StaticText, TextSource, TextSourceAdapter};

/// Registration options for a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    /// Priority multiplier (default 1.0). Higher-weight sources are drawn
    /// first, and in relevance mode the weight scales the similarity.
    pub weight: f64,
    /// Most tokens this source may contribute per selection (0 = unbounded).
    pub max_tokens: usize,
    /// Skip this source instead of failing the turn when it errors.
    pub allow_errors: bool,
    /// Never embed this source's fragments; similarity is taken as 1.0.
    pub skip_embeddings: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            weight: 1.0,
            max_tokens: 0,
            allow_errors: false,
            skip_embeddings: false,
        }
    }
}

impl SourceOptions {
    /// Default options with the given weight.
    pub fn weighted(weight: f64) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn allow_errors(mut self) -> Self {
        self.allow_errors = true;
        self
    }

    pub fn skip_embeddings(mut self) -> Self {
        self.skip_embeddings = true;
        self
    }
}

/// A provider plus the options it was registered with.
#[derive(Clone)]
pub struct RegisteredSource {
    provider: Arc<dyn SourceProvider>,
    options: SourceOptions,
    seq: u64,
}

impl RegisteredSource {
    pub fn provider(&self) -> &dyn SourceProvider {
        self.provider.as_ref()
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn weight(&self) -> f64 {
        self.options.weight
    }

    /// Token cap, `None` when unbounded.
    pub fn max_tokens(&self) -> Option<usize> {
        (self.options.max_tokens > 0).then_some(self.options.max_tokens)
    }

    pub fn allow_errors(&self) -> bool {
        self.options.allow_errors
    }

    pub fn skip_embeddings(&self) -> bool {
        self.options.skip_embeddings
    }

    /// The cap for one selection pass given `allowed` global tokens.
    pub fn budget(&self, allowed: usize) -> usize {
        self.max_tokens().map_or(allowed, |cap| cap.min(allowed))
    }
}

impl std::fmt::Debug for RegisteredSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSource")
            .field("provider", &self.provider.name())
            .field("options", &self.options)
            .field("seq", &self.seq)
            .finish()
    }
}

/// An ordered, weight-descending set of sources.
///
/// Cloning (or [`fork`](Self::fork)ing) copies the sequence; providers are
/// shared read-only between the copies.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
    next_seq: u64,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source and restore weight order.
    pub fn register(&mut self, provider: Arc<dyn SourceProvider>, options: SourceOptions) {
        self.sources.push(RegisteredSource {
            provider,
            options,
            seq: self.next_seq,
        });
        self.next_seq += 1;

        self.sources.sort_by(|a, b| {
            b.options
                .weight
                .partial_cmp(&a.options.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
    }

    /// Register a fixed piece of text as its own source.
    pub fn register_text(&mut self, text: impl Into<String>, options: SourceOptions) {
        self.register(Arc::new(StaticText::new(text)), options);
    }

    /// Register a provider of plain strings.
    pub fn register_text_source<T>(&mut self, source: T, options: SourceOptions)
    where
        T: TextSource + 'static,
    {
        self.register(Arc::new(TextSourceAdapter::new(source)), options);
    }

    /// Independent copy sharing the same providers.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Remove every source.
    pub fn clear(&mut self) {
        self.sources.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSource> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
