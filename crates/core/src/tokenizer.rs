//! Token counting and token-bounded chunking.
//!
//! Tokens are the unit of all budget accounting. A [`TokenCounter`]
//! reports where each token sits in the source text; counting and
//! chunking are derived from those spans, so chunk boundaries are always
//! token boundaries and concatenating the chunks gives back the input.

use std::ops::Range;

use crate::error::TokenizerError;

/// Converts text to tokens.
///
/// Failures are tokenizer bugs or misuse, never normal control flow.
pub trait TokenCounter: Send + Sync {
    /// A human-readable name for this tokenizer.
    fn name(&self) -> &str;

    /// Byte ranges of each token in `text`, in order. Every range must start
    /// on a `char` boundary.
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>, TokenizerError>;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.token_spans(text)?.len())
    }

    /// Split `text` into pieces of at most `max_tokens` tokens each.
    ///
    /// Returns `[text]` unchanged when it already fits.
    fn chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<String>, TokenizerError> {
        if max_tokens == 0 {
            return Err(TokenizerError::InvalidChunkSize);
        }

        let spans = self.token_spans(text)?;
        if spans.len() <= max_tokens {
            return Ok(vec![text.to_string()]);
        }

        let mut chunks = Vec::with_capacity(spans.len().div_ceil(max_tokens));
        let mut start = 0;
        for group in spans.chunks(max_tokens).skip(1) {
            let end = group[0].start.max(start);
            chunks.push(slice(text, start..end)?.to_string());
            start = end;
        }
        chunks.push(slice(text, start..text.len())?.to_string());

        Ok(chunks)
    }
}

fn slice(text: &str, range: Range<usize>) -> Result<&str, TokenizerError> {
    text.get(range.clone()).ok_or_else(|| {
        TokenizerError::Encode(format!(
            "token span {}..{} is not on a character boundary",
            range.start, range.end
        ))
    })
}
