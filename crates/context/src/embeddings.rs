//! Embedding preparation for relevance ranking.
//!
//! Fragments that will be ranked by similarity need a token count and an
//! embedding. This module measures them, optionally splits long ones into
//! token-bounded chunks, and requests all missing embeddings in one call.

use parley_config::SessionConfig;
use parley_core::error::{SourceError, TokenizerError};
use parley_core::fragment::TextFragment;
use parley_core::provider::{EmbeddingRequest, Provider};
use parley_core::tokenizer::TokenCounter;
use tracing::debug;

/// Longest text, in tokens, the embedding service accepts.
pub const MAX_EMBEDDING_TOKENS: usize = 8192;

/// How embeddings are requested.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    pub model: String,
    /// Forwarded to the embedding service; empty means not sent.
    pub user_id: String,
    /// Split fragments longer than this before embedding (0 = never split).
    pub chunk_tokens: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for EmbeddingSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            model: config.embedding_model.clone(),
            user_id: config.user_id.clone(),
            chunk_tokens: config.embedding_chunk_tokens,
        }
    }
}

/// Flatten text for the embedding service: newlines (real or escaped)
/// become spaces and runs of spaces collapse to one.
pub fn normalize_input(text: &str) -> String {
    let flattened = text.replace("\\n", " ").replace(['\n', '\r'], " ");

    let mut out = String::with_capacity(flattened.len());
    let mut last_space = false;
    for c in flattened.chars() {
        if c == ' ' {
            if !last_space {
                out.push(c);
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

/// Measure `fragments` and split the ones that still need an embedding.
///
/// Fragments that already carry an embedding, or that come from a source
/// that skips embeddings, are only measured. The rest are chunked when
/// `chunk_tokens > 0` and longer than that; anything left over the
/// embedding ceiling is dropped.
pub fn prepare_fragments(
    counter: &dyn TokenCounter,
    fragments: Vec<TextFragment>,
    chunk_tokens: usize,
    skip_embeddings: bool,
) -> Result<Vec<TextFragment>, TokenizerError> {
    let chunk_size = match chunk_tokens {
        0 => None,
        n => Some(n.min(MAX_EMBEDDING_TOKENS)),
    };

    let mut prepared = Vec::with_capacity(fragments.len());
    for mut fragment in fragments {
        let tokens = counter.count(&fragment.text)?;

        if skip_embeddings || fragment.has_embedding() {
            fragment.set_token_count(tokens);
            prepared.push(fragment);
            continue;
        }

        if let Some(size) = chunk_size.filter(|size| tokens > *size) {
            let pieces = counter.chunk(&fragment.text, size)?;
            let total = pieces.len();
            for (index, piece) in pieces.into_iter().enumerate() {
                let piece_tokens = counter.count(&piece)?;
                if piece_tokens > MAX_EMBEDDING_TOKENS {
                    debug!(identifier = %fragment.identifier, index, piece_tokens, "Chunk too long to embed, skipping");
                    continue;
                }
                prepared.push(fragment.chunk(index, total, piece, piece_tokens));
            }
            continue;
        }

        if tokens > MAX_EMBEDDING_TOKENS {
            debug!(identifier = %fragment.identifier, tokens, "Fragment too long to embed, skipping");
            continue;
        }

        fragment.set_token_count(tokens);
        prepared.push(fragment);
    }

    Ok(prepared)
}

/// Embed `texts` in a single request, returning one vector per input.
pub async fn embed_texts(
    provider: &dyn Provider,
    settings: &EmbeddingSettings,
    texts: &[&str],
) -> Result<Vec<Vec<f32>>, SourceError> {
    let expected = texts.len();
    debug!(provider = provider.name(), model = %settings.model, count = expected, "Requesting embeddings");

    let request = EmbeddingRequest {
        model: settings.model.clone(),
        inputs: texts.iter().map(|t| normalize_input(t)).collect(),
        user: (!settings.user_id.is_empty()).then(|| settings.user_id.clone()),
    };

    let response = provider.embed(request).await?;
    if response.embeddings.len() != expected {
        return Err(SourceError::EmbeddingCount {
            expected,
            actual: response.embeddings.len(),
        });
    }

    Ok(response.embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, WordCounter, words};

    #[test]
    fn normalize_flattens_newlines_and_spaces() {
        assert_eq!(normalize_input("a\nb"), "a b");
        assert_eq!(normalize_input("a \n  b"), "a b");
        assert_eq!(normalize_input("line\\nnext"), "line next");
        assert_eq!(normalize_input("plain"), "plain");
    }

    #[test]
    fn existing_embeddings_are_only_measured() {
        let fragments = vec![TextFragment::new("a", words(3)).with_embedding(vec![1.0])];
        let prepared = prepare_fragments(&WordCounter, fragments, 1, false).unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].identifier, "a");
        assert_eq!(prepared[0].token_count(), 3);
    }

    #[test]
    fn long_fragments_are_chunked() {
        let fragment = TextFragment::new("doc", words(5))
            .with_weight(0.5)
            .with_metadata(serde_json::json!({"page": 1}));
        let prepared = prepare_fragments(&WordCounter, vec![fragment], 2, false).unwrap();

        let ids: Vec<_> = prepared.iter().map(|f| f.identifier.as_str()).collect();
        assert_eq!(ids, vec!["doc--0", "doc--1", "doc--2"]);
        assert!(prepared.iter().all(|f| f.total_chunks() == 3));
        assert!(prepared.iter().all(|f| f.weight == 0.5));
        assert_eq!(prepared[2].metadata["page"], 1);

        let tokens: Vec<_> = prepared.iter().map(|f| f.token_count()).collect();
        assert_eq!(tokens, vec![2, 2, 1]);

        let rebuilt: String = prepared.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(rebuilt, words(5));
    }

    #[test]
    fn skip_embedding_sources_are_never_chunked() {
        let fragments = vec![TextFragment::new("doc", words(5))];
        let prepared = prepare_fragments(&WordCounter, fragments, 2, true).unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].token_count(), 5);
    }

    #[test]
    fn oversized_fragments_without_embedding_are_dropped() {
        let huge = TextFragment::new("huge", words(MAX_EMBEDDING_TOKENS + 1));
        let small = TextFragment::new("small", words(4));
        let prepared = prepare_fragments(&WordCounter, vec![huge.clone(), small], 0, false).unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].identifier, "small");

        let embedded = huge.with_embedding(vec![0.5]);
        let prepared = prepare_fragments(&WordCounter, vec![embedded], 0, false).unwrap();
        assert_eq!(prepared.len(), 1);
    }

    #[tokio::test]
    async fn embed_texts_normalizes_and_forwards_user() {
        let provider = ScriptedProvider::new()
            .with_embedding("hello world", vec![1.0, 0.0]);
        let settings = EmbeddingSettings {
            user_id: "user-1".into(),
            ..EmbeddingSettings::default()
        };

        let vectors = embed_texts(&provider, &settings, &["hello\nworld"]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0]]);

        let requests = provider.embedding_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].inputs, vec!["hello world".to_string()]);
        assert_eq!(requests[0].user.as_deref(), Some("user-1"));
        assert_eq!(requests[0].model, "text-embedding-ada-002");
    }

    #[tokio::test]
    async fn embed_texts_rejects_count_mismatch() {
        let provider = ScriptedProvider::new().with_short_embedding_batches();
        let err = embed_texts(&provider, &EmbeddingSettings::default(), &["a", "b"])
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::EmbeddingCount { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn embed_texts_wraps_provider_failures() {
        let provider = ScriptedProvider::new().with_failing_embeddings();
        let err = embed_texts(&provider, &EmbeddingSettings::default(), &["a"])
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Embedding(_)));
    }
}
