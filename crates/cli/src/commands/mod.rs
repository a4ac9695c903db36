pub mod chat;
pub mod init;
pub mod tokens;

use std::sync::Arc;

use parley_core::tokenizer::TokenCounter;
use parley_tokens::HeuristicCounter;

/// The tokenizer selected by `--tokenizer`, or the character heuristic.
pub fn token_counter(tokenizer: Option<&str>) -> anyhow::Result<Arc<dyn TokenCounter>> {
    match tokenizer {
        None => Ok(Arc::new(HeuristicCounter)),
        Some(source) => load_tokenizer(source),
    }
}

#[cfg(feature = "hf")]
fn load_tokenizer(source: &str) -> anyhow::Result<Arc<dyn TokenCounter>> {
    use parley_tokens::HfTokenCounter;

    let path = std::path::Path::new(source);
    let counter = if path.is_file() {
        HfTokenCounter::from_file(path)?
    } else {
        HfTokenCounter::from_pretrained(source)?
    };
    Ok(Arc::new(counter))
}

#[cfg(not(feature = "hf"))]
fn load_tokenizer(source: &str) -> anyhow::Result<Arc<dyn TokenCounter>> {
    anyhow::bail!("cannot load tokenizer '{source}': parley was built without the `hf` feature")
}
