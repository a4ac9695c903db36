//! HuggingFace `tokenizers` backed counter.
//!
//! Loads a `tokenizer.json` either from disk or from the HuggingFace Hub.
//! Chunks are cut at token start offsets in the original text, so they
//! concatenate back to the input; tokenizers with normalizers that trim
//! or rewrite text may report offsets that overlap, in which case a chunk
//! can come out one token larger or smaller than requested. That drift is
//! accepted: budgets are enforced on the recounted chunk.

use std::ops::Range;
use std::path::Path;

use hf_hub::api::sync::Api;
use parley_core::error::TokenizerError;
use parley_core::tokenizer::TokenCounter;
use tokenizers::Tokenizer;
use tracing::info;

/// A [`TokenCounter`] backed by a HuggingFace tokenizer.
pub struct HfTokenCounter {
    name: String,
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    /// Load a `tokenizer.json` from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| TokenizerError::Load(format!("{}: {e}", path.display())))?;
        Ok(Self {
            name: path.display().to_string(),
            tokenizer,
        })
    }

    /// Download (or reuse the cached) `tokenizer.json` of a Hub repository.
    pub fn from_pretrained(repo: &str) -> Result<Self, TokenizerError> {
        let api = Api::new().map_err(|e| TokenizerError::Load(format!("HuggingFace Hub API error: {e}")))?;
        let path = api
            .model(repo.to_string())
            .get("tokenizer.json")
            .map_err(|e| TokenizerError::Load(format!("Failed to download tokenizer from '{repo}': {e}")))?;

        info!(repo, path = %path.display(), "Tokenizer ready");

        let mut counter = Self::from_file(&path)?;
        counter.name = repo.to_string();
        Ok(counter)
    }
}

impl TokenCounter for HfTokenCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>, TokenizerError> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| TokenizerError::Encode(e.to_string()))?;

        // Snap starts back onto char boundaries; byte-level BPE can split a
        // multi-byte character across tokens.
        Ok(encoding
            .get_offsets()
            .iter()
            .map(|&(start, end)| {
                let mut start = start.min(text.len());
                while !text.is_char_boundary(start) {
                    start -= 1;
                }
                start..end.max(start)
            })
            .collect())
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| TokenizerError::Encode(e.to_string()))?;
        Ok(encoding.len())
    }
}
