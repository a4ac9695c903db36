//! Text fragments: the unit of retrievable context.

use serde::{Deserialize, Serialize};

/// A unit of retrievable context produced by a source.
///
/// Providers fill in `identifier`, `text` and optionally `embedding`,
/// `weight` and `metadata`. The chunk position and the token count are
/// owned by the selector: they are set when the fragment is measured or
/// split, and read through accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Stable key for a source item. Suffixed with `--{chunk}` when split.
    pub identifier: String,
    /// The literal content.
    pub text: String,
    /// Precomputed embedding; computed on demand when relevance ranking
    /// needs it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Per-fragment override of the source weight (0 = inherit).
    #[serde(default)]
    pub weight: f64,
    /// Free-form data carried through to the caller with used fragments.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,

    #[serde(default)]
    chunk_index: usize,
    #[serde(default)]
    total_chunks: usize,
    #[serde(default)]
    token_count: usize,
}

impl TextFragment {
    /// Create a fragment from an identifier and its text.
    pub fn new(identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Create a fragment with no identifier.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(String::new(), text)
    }

    /// Attach a precomputed embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Override the source weight for this fragment.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Attach caller metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Build the `index`-th of `total` chunks split out of this fragment.
    pub fn chunk(&self, index: usize, total: usize, text: String, token_count: usize) -> Self {
        Self {
            identifier: format!("{}--{}", self.identifier, index),
            text,
            embedding: None,
            weight: self.weight,
            metadata: self.metadata.clone(),
            chunk_index: index,
            total_chunks: total,
            token_count,
        }
    }

    /// Record the token count of `text`, as measured by the session's counter.
    pub fn set_token_count(&mut self, token_count: usize) {
        self.token_count = token_count;
    }

    /// Cached token count of `text`.
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Position within the split parent item.
    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    /// Number of chunks the parent item was split into (0 = never split).
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// Has an embedding been attached or computed?
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}
