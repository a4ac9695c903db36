//! Context assembly for parley sessions.
//!
//! A [`ConversationSession`] keeps rolling history under a token budget and,
//! on every turn, fills whatever budget is left with text drawn from the
//! sources in its [`SourceRegistry`]:
//!
//! 1. **Trim** the oldest history if preamble + history is over its cap
//! 2. **Record** the user turn
//! 3. **Select** source fragments with the [`ContextSelector`], by weight
//!    alone or by weighted similarity to the prompt
//! 4. **Complete** with preamble + selected text, then the history
//! 5. **Record** the assistant turn
//!
//! Typed questions go through [`ConversationSession::ask`] with an
//! [`AnswerType`].

pub mod answer;
pub mod embeddings;
pub mod error;
pub mod registry;
pub mod selector;
pub mod session;
pub mod similarity;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use answer::{AnswerError, AnswerType, AnswerValue, RecordField};
pub use embeddings::{EmbeddingSettings, MAX_EMBEDDING_TOKENS};
pub use error::ContextError;
pub use registry::{RegisteredSource, SourceOptions, SourceRegistry};
pub use selector::{ContextSelector, SelectedFragment, SelectionMode, render_context};
pub use session::{ConversationSession, HistoryEntry, TurnOutcome, default_preamble};
pub use similarity::cosine_similarity;
