//! Completion and embedding provider implementations for parley.
//!
//! All providers implement the `parley_core::Provider` trait.

pub mod openai_compat;

use std::sync::Arc;

use parley_config::AppConfig;
use parley_core::error::ProviderError;
use parley_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// A missing API key is only accepted for local endpoints that ignore it.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let is_local = config.api_url.contains("localhost") || config.api_url.contains("127.0.0.1");

    let api_key = match (&config.api_key, is_local) {
        (Some(key), _) => key.clone(),
        (None, true) => String::new(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(
                "No API key found; set PARLEY_API_KEY or OPENAI_API_KEY".into(),
            ));
        }
    };

    let name = if is_local { "local" } else { "openai" };
    Ok(Arc::new(OpenAiCompatProvider::new(name, &config.api_url, api_key)))
}
