//! End-to-end scenarios for context selection and conversation sessions.
//!
//! These run the real heuristic tokenizer (4 characters per token) against
//! scripted completion/embedding services and in-memory sources.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_config::SessionConfig;
use parley_context::{
    ContextError, ContextSelector, ConversationSession, EmbeddingSettings, SelectedFragment,
    SelectionMode, SourceOptions, SourceRegistry,
};
use parley_core::error::{ProviderError, SourceError};
use parley_core::fragment::TextFragment;
use parley_core::message::{Message, Role};
use parley_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
};
use parley_core::source::SourceProvider;
use parley_core::tokenizer::TokenCounter;
use parley_tokens::HeuristicCounter;

// ── Mocks ────────────────────────────────────────────────────────────────

/// Answers every completion with a fixed reply and embeds by lookup.
#[derive(Default)]
struct ScriptedProvider {
    reply: String,
    embeddings: HashMap<String, Vec<f32>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn reply(text: &str) -> Self {
        Self {
            reply: text.to_string(),
            ..Self::default()
        }
    }

    fn with_embedding(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.embeddings.insert(text.to_string(), vector);
        self
    }

    fn last_system_message(&self) -> String {
        let requests = self.requests.lock().unwrap();
        requests.last().unwrap().messages[0].content.clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scenario_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            message: Message::assistant(self.reply.clone()),
            usage: None,
            model,
            metadata: serde_json::Map::new(),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let embeddings = request
            .inputs
            .iter()
            .map(|input| self.embeddings.get(input).cloned().unwrap_or_default())
            .collect();
        Ok(EmbeddingResponse {
            embeddings,
            model: request.model,
            usage: None,
        })
    }
}

/// Never answers; used to cancel a turn mid-flight.
struct PendingProvider;

#[async_trait::async_trait]
impl Provider for PendingProvider {
    fn name(&self) -> &str {
        "pending"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

struct Fragments {
    name: String,
    fragments: Vec<TextFragment>,
}

#[async_trait::async_trait]
impl SourceProvider for Fragments {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _prompt: &str) -> Result<Vec<TextFragment>, SourceError> {
        Ok(self.fragments.clone())
    }
}

struct Broken;

#[async_trait::async_trait]
impl SourceProvider for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn fetch(&self, _prompt: &str) -> Result<Vec<TextFragment>, SourceError> {
        Err(SourceError::fetch("broken", "connection refused"))
    }
}

/// Text that the heuristic counter measures as exactly `n` tokens.
fn tokens(n: usize) -> String {
    "abcd".repeat(n)
}

fn source(name: &str, sizes: &[usize]) -> Arc<Fragments> {
    Arc::new(Fragments {
        name: name.to_string(),
        fragments: sizes
            .iter()
            .enumerate()
            .map(|(i, n)| TextFragment::new(format!("{name}-{i}"), tokens(*n)))
            .collect(),
    })
}

fn ids(fragments: &[SelectedFragment]) -> Vec<&str> {
    fragments.iter().map(|f| f.fragment.identifier.as_str()).collect()
}

fn selector() -> ContextSelector {
    ContextSelector::new(
        Arc::new(HeuristicCounter),
        Arc::new(ScriptedProvider::default()),
        EmbeddingSettings::default(),
    )
}

fn session(provider: Arc<dyn Provider>, config: SessionConfig) -> ConversationSession {
    // "sys." is one token
    ConversationSession::new(provider, Arc::new(HeuristicCounter), config, "sys.").unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn oversized_fragment_is_dropped_not_truncated() {
    let provider = Arc::new(ScriptedProvider::reply("ok"));
    let config = SessionConfig::default()
        .with_max_total_tokens(50)
        .with_max_response_tokens(10)
        .with_max_history_tokens(20);
    let mut s = session(provider.clone(), config);
    s.registry_mut()
        .register(source("docs", &[5, 100]), SourceOptions::default());

    let outcome = s.execute_prompt("hi").await.unwrap();

    assert_eq!(ids(&outcome.fragments), vec!["docs-0"]);
    assert_eq!(outcome.fragments[0].fragment.token_count(), 5);
    assert_eq!(provider.last_system_message(), format!("sys.{}", tokens(5)));
}

#[tokio::test]
async fn heavier_source_wins_a_tight_budget() {
    let mut registry = SourceRegistry::new();
    registry.register(source("light", &[10]), SourceOptions::weighted(1.0));
    registry.register(source("heavy", &[10]), SourceOptions::weighted(2.0));

    let selected = selector()
        .select(&registry, "q", 10, SelectionMode::Weighted)
        .await
        .unwrap();

    assert_eq!(ids(&selected), vec!["heavy-0"]);
}

#[tokio::test]
async fn weighted_similarity_below_threshold_is_excluded() {
    let prompt = "birds";
    let similar = vec![0.9f32, (1.0f32 - 0.81).sqrt()];
    let provider = Arc::new(
        ScriptedProvider::reply("ok")
            .with_embedding(prompt, vec![1.0, 0.0])
            .with_embedding(&tokens(3), similar),
    );
    let config = SessionConfig::default()
        .with_embeddings(true)
        .with_similarity_threshold(0.7);
    let mut s = session(provider, config);
    s.registry_mut()
        .register(source("half", &[3]), SourceOptions::weighted(0.5));

    let outcome = s.execute_prompt(prompt).await.unwrap();
    assert!(outcome.fragments.is_empty());

    // The same fragment at full weight clears the bar.
    s.purge_sources();
    s.registry_mut()
        .register(source("full", &[3]), SourceOptions::default());
    let outcome = s.execute_prompt(prompt).await.unwrap();
    assert_eq!(ids(&outcome.fragments), vec!["full-0"]);
}

#[tokio::test]
async fn replacing_history_twice_doubles_the_count() {
    let mut s = session(Arc::new(ScriptedProvider::reply("ok")), SessionConfig::default());
    let history = vec![
        Message::user(tokens(2)),
        Message::assistant(tokens(3)),
        Message::user(tokens(4)),
    ];

    s.replace_history(history.clone()).unwrap();
    s.replace_history(history).unwrap();

    assert_eq!(s.history().len(), 3);
    assert_eq!(s.history_tokens(), 2 * 9);
}

#[tokio::test]
async fn tolerant_failing_source_is_skipped() {
    let mut s = session(Arc::new(ScriptedProvider::reply("ok")), SessionConfig::default());
    s.registry_mut()
        .register(Arc::new(Broken), SourceOptions::weighted(5.0).allow_errors());
    s.registry_mut()
        .register(source("docs", &[2]), SourceOptions::default());

    let outcome = s.execute_prompt("q").await.unwrap();
    assert_eq!(ids(&outcome.fragments), vec!["docs-0"]);
}

#[tokio::test]
async fn intolerant_failing_source_fails_the_turn() {
    let mut s = session(Arc::new(ScriptedProvider::reply("ok")), SessionConfig::default());
    s.registry_mut()
        .register(Arc::new(Broken), SourceOptions::default());

    let err = s.execute_prompt("q").await.unwrap_err();
    assert!(matches!(err, ContextError::Source(_)));
    let roles: Vec<Role> = s.history().iter().map(|e| e.message.role).collect();
    assert_eq!(roles, vec![Role::User]);
}

// ── Properties ───────────────────────────────────────────────────────────

#[tokio::test]
async fn selections_never_exceed_budgets() {
    let mut registry = SourceRegistry::new();
    registry.register(source("a", &[3, 7, 2, 9]), SourceOptions::weighted(2.0).max_tokens(10));
    registry.register(source("b", &[1, 1, 4, 6]), SourceOptions::weighted(1.5));
    registry.register(source("c", &[5, 5, 5]), SourceOptions::default().max_tokens(7));
    let caps = [("a", 10), ("b", usize::MAX), ("c", 7)];

    let mut provider = ScriptedProvider::default().with_embedding("q", vec![1.0]);
    for n in [1, 2, 3, 4, 5, 6, 7, 9] {
        provider = provider.with_embedding(&tokens(n), vec![1.0]);
    }
    let relevant = ContextSelector::new(
        Arc::new(HeuristicCounter),
        Arc::new(provider),
        EmbeddingSettings::default(),
    );

    for allowed in 0..40 {
        for (picker, mode) in [
            (selector(), SelectionMode::Weighted),
            (relevant.clone(), SelectionMode::Relevance { min_weighted_similarity: 0.5 }),
        ] {
            let selected = picker.select(&registry, "q", allowed, mode).await.unwrap();

            let total: usize = selected.iter().map(|f| f.fragment.token_count()).sum();
            assert!(total <= allowed, "{mode:?} used {total} of {allowed}");

            for (name, cap) in caps {
                let used: usize = selected
                    .iter()
                    .filter(|f| f.source == name)
                    .map(|f| f.fragment.token_count())
                    .sum();
                assert!(used <= cap.min(allowed), "{mode:?} source {name} used {used}");
            }

            for f in &selected {
                assert_eq!(f.fragment.token_count(), HeuristicCounter.count(&f.fragment.text).unwrap());
            }

            if let SelectionMode::Relevance { min_weighted_similarity } = mode {
                let scores: Vec<f64> = selected.iter().filter_map(|f| f.score).collect();
                assert!(scores.iter().all(|s| *s >= min_weighted_similarity));
                assert!(scores.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }
}

#[tokio::test]
async fn history_stays_under_cap_and_drops_oldest_first() {
    let provider = Arc::new(ScriptedProvider::reply(&tokens(3)));
    let config = SessionConfig::default().with_max_history_tokens(20);
    let mut s = session(provider, config);

    for turn in 0..10 {
        s.execute_prompt(&format!("turn{turn:04}")).await.unwrap();
        // The trim leaves history plus preamble within the cap, then this
        // turn adds its two entries (2 + 3 tokens).
        assert!(s.history_tokens() <= 20 - s.preamble_tokens() + 5);
    }

    // What survives is an unbroken run of the most recent turns.
    let prompts: Vec<&str> = s
        .history()
        .iter()
        .filter(|e| e.message.role == Role::User)
        .map(|e| e.message.content.as_str())
        .collect();
    assert!(prompts.len() < 10);
    let expected: Vec<String> = (10 - prompts.len()..10).map(|t| format!("turn{t:04}")).collect();
    assert_eq!(prompts, expected);
}

#[tokio::test]
async fn preamble_over_history_cap_clears_history_each_turn() {
    let provider = Arc::new(ScriptedProvider::reply(&tokens(3)));
    let config = SessionConfig::default().with_max_history_tokens(5);
    let mut s = ConversationSession::new(
        provider.clone(),
        Arc::new(HeuristicCounter),
        config,
        tokens(10),
    )
    .unwrap();
    assert_eq!(s.preamble_tokens(), 10);

    for turn in 0..3 {
        let prompt = format!("turn{turn:04}");
        s.execute_prompt(&prompt).await.unwrap();

        // Only this turn survives: 2 prompt tokens + 3 reply tokens.
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history()[0].message.content, prompt);
        assert_eq!(s.history_tokens(), 5);

        // The request carried the system message and this turn's prompt only.
        let requests = provider.requests.lock().unwrap();
        let messages = &requests.last().unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, prompt);
    }
}

#[test]
fn chunking_an_already_fitting_text_is_identity() {
    let text = "The quick brown fox jumps over the lazy dog.";
    let n = HeuristicCounter.count(text).unwrap();
    for size in [n, n + 1, n * 3] {
        assert_eq!(HeuristicCounter.chunk(text, size).unwrap(), vec![text.to_string()]);
    }
}

// ── Fork & cancellation ──────────────────────────────────────────────────

#[tokio::test]
async fn forks_run_concurrently_without_touching_the_parent() {
    let provider = Arc::new(ScriptedProvider::reply("ok"));
    let mut parent = session(provider, SessionConfig::default());
    parent
        .registry_mut()
        .register_text("shared background", SourceOptions::default());
    parent.execute_prompt("hello").await.unwrap();

    let mut left = parent.fork();
    let mut right = parent.fork_with(|c| c.with_model("gpt-4"));
    right.purge_sources();

    let (a, b) = tokio::join!(left.execute_prompt("left"), right.execute_prompt("right"));
    assert_eq!(a.unwrap().fragments.len(), 1);
    assert!(b.unwrap().fragments.is_empty());

    assert_eq!(parent.history().len(), 2);
    assert_eq!(left.history().len(), 4);
    assert_eq!(right.history().len(), 4);
    assert_eq!(parent.registry().len(), 1);
    assert_eq!(right.config().model, "gpt-4");
}

#[tokio::test(start_paused = true)]
async fn cancelled_turn_leaves_history_untouched() {
    let mut s = session(Arc::new(PendingProvider), SessionConfig::default());
    s.replace_history(vec![Message::user("earlier"), Message::assistant("reply")])
        .unwrap();
    let before = s.history().to_vec();
    let tokens_before = s.history_tokens();

    let result = tokio::time::timeout(Duration::from_secs(30), s.execute_prompt("never answered")).await;

    assert!(result.is_err(), "turn should have timed out");
    assert_eq!(s.history(), before.as_slice());
    assert_eq!(s.history_tokens(), tokens_before);
}
