//! Token counter implementations for parley.
//!
//! All counters implement `parley_core::TokenCounter`. The heuristic
//! counter is always available; the HuggingFace-backed one is compiled in
//! with the `hf` feature.

pub mod heuristic;
#[cfg(feature = "hf")]
pub mod hf;

pub use heuristic::{HeuristicCounter, estimate_tokens};
#[cfg(feature = "hf")]
pub use hf::HfTokenCounter;
