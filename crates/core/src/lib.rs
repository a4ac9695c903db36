//! # Parley Core
//!
//! Domain types, collaborator traits, and error definitions for parley.
//! This crate has no framework dependencies: it defines the model that
//! the tokenizer, provider, and context crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: chat completions and embeddings
//! - [`SourceProvider`]: candidate context fragments for a prompt
//! - [`TokenCounter`]: token accounting and chunking
//!
//! Implementations live in their respective crates, and tests swap in
//! scripted stand-ins.

pub mod error;
pub mod fragment;
pub mod message;
pub mod provider;
pub mod source;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, SourceError, TokenizerError};
pub use fragment::TextFragment;
pub use message::{Message, Role};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
pub use source::{SourceProvider, StaticText, TextSource, TextSourceAdapter};
pub use tokenizer::TokenCounter;
