//! `parley tokens`: count a file's tokens, optionally splitting it.

use std::path::Path;

use anyhow::Context;
use parley_core::tokenizer::TokenCounter;

pub fn run(path: &Path, chunk: Option<usize>, counter: &dyn TokenCounter) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let total = counter.count(&text)?;
    println!("{}: {total} tokens ({})", path.display(), counter.name());

    if let Some(size) = chunk {
        let chunks = counter.chunk(&text, size)?;
        println!("{} chunks of at most {size} tokens", chunks.len());
        for (i, piece) in chunks.iter().enumerate() {
            let preview: String = piece.chars().take(60).collect();
            println!("  [{i}] {:>5} tokens  {}", counter.count(piece)?, preview.replace('\n', " "));
        }
    }

    Ok(())
}
