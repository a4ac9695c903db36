//! Turn-level error type.

use parley_core::error::{ProviderError, SourceError, TokenizerError};
use thiserror::Error;

use crate::answer::AnswerError;

/// Everything that can end a selection pass or a conversation turn early.
///
/// Running out of budget is not here: it is how packing normally stops.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A source or the embedding service failed and the source did not opt
    /// into `allow_errors`. No completion request was made.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The completion service failed. The user turn stays in history.
    #[error("Completion failed: {0}")]
    Completion(#[source] ProviderError),

    /// The tokenizer is broken or was misused.
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    /// The reply could not be decoded into the requested answer type.
    #[error("Answer error: {0}")]
    Answer(#[from] AnswerError),
}
