//! Context selection: packs source fragments into a token budget.
//!
//! Two strategies:
//! - **Weighted**: walk sources in registry (weight) order and take each
//!   source's fragments in the order it returned them, until the source cap
//!   or the global budget is hit.
//! - **Relevance**: gather every source's fragments, score each as
//!   `cosine(prompt, fragment) * weight`, drop those under the threshold and
//!   take the best-scoring ones that still fit their source cap and the
//!   global budget.
//!
//! Running out of budget ends packing normally. Source failures end the
//! selection unless the source was registered with `allow_errors`.

use std::cmp::Ordering;
use std::sync::Arc;

use parley_core::error::SourceError;
use parley_core::fragment::TextFragment;
use parley_core::provider::Provider;
use parley_core::tokenizer::TokenCounter;
use tracing::{debug, warn};

use crate::embeddings::{self, EmbeddingSettings};
use crate::error::ContextError;
use crate::registry::{RegisteredSource, SourceRegistry};
use crate::similarity::cosine_similarity;

/// How fragments are chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionMode {
    /// Registry order, no embeddings.
    Weighted,
    /// Rank by weighted similarity to the prompt.
    Relevance { min_weighted_similarity: f64 },
}

/// A fragment chosen for the prompt context.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFragment {
    /// The fragment, with its token count set and its effective weight
    /// filled in.
    pub fragment: TextFragment,
    /// Name of the source it came from.
    pub source: String,
    /// Weighted similarity in relevance mode, `None` in weighted mode.
    pub score: Option<f64>,
}

impl SelectedFragment {
    fn new(mut fragment: TextFragment, source: &RegisteredSource, score: Option<f64>) -> Self {
        fragment.weight = effective_weight(&fragment, source);
        Self {
            fragment,
            source: source.name().to_string(),
            score,
        }
    }
}

/// Join fragment texts with newlines, in selection order.
pub fn render_context(selected: &[SelectedFragment]) -> String {
    selected
        .iter()
        .map(|s| s.fragment.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Total tokens of a selection.
pub fn selected_tokens(selected: &[SelectedFragment]) -> usize {
    selected.iter().map(|s| s.fragment.token_count()).sum()
}

fn effective_weight(fragment: &TextFragment, source: &RegisteredSource) -> f64 {
    if fragment.weight == 0.0 {
        source.weight()
    } else {
        fragment.weight
    }
}

struct Candidate {
    fragment: TextFragment,
    source: usize,
}

/// The ranking and packing engine.
#[derive(Clone)]
pub struct ContextSelector {
    counter: Arc<dyn TokenCounter>,
    embedder: Arc<dyn Provider>,
    settings: EmbeddingSettings,
}

impl ContextSelector {
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        embedder: Arc<dyn Provider>,
        settings: EmbeddingSettings,
    ) -> Self {
        Self {
            counter,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &EmbeddingSettings {
        &self.settings
    }

    /// Choose fragments for `prompt` whose token counts sum to at most
    /// `allowed_tokens`, in selection order.
    pub async fn select(
        &self,
        registry: &SourceRegistry,
        prompt: &str,
        allowed_tokens: usize,
        mode: SelectionMode,
    ) -> Result<Vec<SelectedFragment>, ContextError> {
        if allowed_tokens == 0 {
            debug!("No token budget left for source text");
            return Ok(Vec::new());
        }

        debug!(sources = registry.len(), allowed_tokens, ?mode, "Pulling contextual info");
        match mode {
            SelectionMode::Weighted => self.select_weighted(registry, prompt, allowed_tokens).await,
            SelectionMode::Relevance {
                min_weighted_similarity,
            } => {
                self.select_relevant(registry, prompt, allowed_tokens, min_weighted_similarity)
                    .await
            }
        }
    }

    async fn select_weighted(
        &self,
        registry: &SourceRegistry,
        prompt: &str,
        allowed_tokens: usize,
    ) -> Result<Vec<SelectedFragment>, ContextError> {
        let mut remaining = allowed_tokens;
        let mut selected = Vec::new();

        for source in registry.iter() {
            let Some(fragments) = fetch(source, prompt).await? else {
                continue;
            };

            let budget = source.budget(remaining);
            let mut used = 0;
            for mut fragment in fragments {
                let tokens = self.counter.count(&fragment.text)?;
                if used + tokens > budget {
                    debug!(source = source.name(), used, budget, "Source budget reached");
                    break;
                }
                used += tokens;
                fragment.set_token_count(tokens);
                selected.push(SelectedFragment::new(fragment, source, None));
            }

            remaining -= used;
            if remaining == 0 {
                break;
            }
        }

        Ok(selected)
    }

    async fn select_relevant(
        &self,
        registry: &SourceRegistry,
        prompt: &str,
        allowed_tokens: usize,
        threshold: f64,
    ) -> Result<Vec<SelectedFragment>, ContextError> {
        let sources: Vec<&RegisteredSource> = registry.iter().collect();

        let mut candidates = Vec::new();
        for (index, source) in sources.iter().enumerate() {
            let Some(fragments) = fetch(source, prompt).await? else {
                continue;
            };
            let prepared = embeddings::prepare_fragments(
                self.counter.as_ref(),
                fragments,
                self.settings.chunk_tokens,
                source.skip_embeddings(),
            )?;
            candidates.extend(prepared.into_iter().map(|fragment| Candidate {
                fragment,
                source: index,
            }));
        }

        let prompt_embedding = self.embed_prompt(prompt, &sources, &mut candidates).await?;
        self.embed_missing(&sources, &mut candidates).await?;

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let source = sources[candidate.source];
            let similarity = if source.skip_embeddings() {
                1.0
            } else {
                let vector = candidate.fragment.embedding.as_deref().unwrap_or_default();
                let target = prompt_embedding.as_deref().unwrap_or_default();
                if vector.is_empty() || vector.len() != target.len() {
                    let err = SourceError::EmbeddingDimension {
                        identifier: candidate.fragment.identifier.clone(),
                        expected: target.len(),
                        actual: vector.len(),
                    };
                    if !source.allow_errors() {
                        return Err(err.into());
                    }
                    warn!(source = source.name(), error = %err, "Unusable embedding, skipping");
                    continue;
                }
                cosine_similarity(vector, target)
            };

            let score = similarity * effective_weight(&candidate.fragment, source);
            if score < threshold {
                debug!(
                    identifier = %candidate.fragment.identifier,
                    similarity,
                    score,
                    threshold,
                    "Below similarity threshold, skipping"
                );
                continue;
            }
            scored.push((score, candidate));
        }

        // Stable: equal scores keep registry order, then fetch order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut source_remaining: Vec<usize> =
            sources.iter().map(|s| s.budget(allowed_tokens)).collect();
        let mut remaining = allowed_tokens;
        let mut selected = Vec::new();

        for (score, candidate) in scored {
            let tokens = candidate.fragment.token_count();
            if tokens > source_remaining[candidate.source] || tokens > remaining {
                debug!(identifier = %candidate.fragment.identifier, tokens, "Does not fit, skipping");
                continue;
            }
            source_remaining[candidate.source] -= tokens;
            remaining -= tokens;
            selected.push(SelectedFragment::new(
                candidate.fragment,
                sources[candidate.source],
                Some(score),
            ));
            if remaining == 0 {
                break;
            }
        }

        Ok(selected)
    }

    /// Embed the prompt when any candidate will be compared against it.
    ///
    /// On a tolerated failure the candidates that needed it are dropped.
    async fn embed_prompt(
        &self,
        prompt: &str,
        sources: &[&RegisteredSource],
        candidates: &mut Vec<Candidate>,
    ) -> Result<Option<Vec<f32>>, SourceError> {
        let ranked = |c: &Candidate| !sources[c.source].skip_embeddings();
        if !candidates.iter().any(ranked) {
            return Ok(None);
        }

        match embeddings::embed_texts(self.embedder.as_ref(), &self.settings, &[prompt]).await {
            Ok(mut vectors) => Ok(vectors.pop()),
            Err(err) => {
                tolerate(err, candidates.iter().filter(|c| ranked(*c)).map(|c| sources[c.source]))?;
                candidates.retain(|c| !ranked(c));
                Ok(None)
            }
        }
    }

    /// Fill in every missing embedding with one batched request.
    async fn embed_missing(
        &self,
        sources: &[&RegisteredSource],
        candidates: &mut Vec<Candidate>,
    ) -> Result<(), SourceError> {
        let missing = |c: &Candidate| {
            !sources[c.source].skip_embeddings() && !c.fragment.has_embedding()
        };

        let indices: Vec<usize> = (0..candidates.len())
            .filter(|&i| missing(&candidates[i]))
            .collect();
        if indices.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = indices
            .iter()
            .map(|&i| candidates[i].fragment.text.as_str())
            .collect();

        match embeddings::embed_texts(self.embedder.as_ref(), &self.settings, &texts).await {
            Ok(vectors) => {
                for (i, vector) in indices.into_iter().zip(vectors) {
                    candidates[i].fragment.embedding = Some(vector);
                }
                Ok(())
            }
            Err(err) => {
                tolerate(err, indices.iter().map(|&i| sources[candidates[i].source]))?;
                candidates.retain(|c| !missing(c));
                Ok(())
            }
        }
    }
}

/// Pull fragments from one source. `Ok(None)` means the source failed and
/// is allowed to.
async fn fetch(
    source: &RegisteredSource,
    prompt: &str,
) -> Result<Option<Vec<TextFragment>>, SourceError> {
    match source.provider().fetch(prompt).await {
        Ok(fragments) => {
            debug!(source = source.name(), count = fragments.len(), "Fetched fragments");
            Ok(Some(fragments))
        }
        Err(err) if source.allow_errors() => {
            warn!(source = source.name(), error = %err, "Source failed, skipping");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// An embedding failure is tolerated only when every affected source
/// allows errors.
fn tolerate<'a>(
    err: SourceError,
    mut affected: impl Iterator<Item = &'a RegisteredSource>,
) -> Result<(), SourceError> {
    if affected.all(RegisteredSource::allow_errors) {
        warn!(error = %err, "Embedding failed, dropping fragments from tolerant sources");
        Ok(())
    } else {
        Err(err)
    }
}
