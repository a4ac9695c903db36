//! Conversation session: rolling history under a token budget.
//!
//! One turn runs as:
//! 1. drop the oldest history if preamble + history is over the history cap
//! 2. record the user turn
//! 3. give whatever the budget leaves to source text
//! 4. send preamble + context, then the history, to the completion service
//! 5. record the assistant turn
//!
//! The turn is staged on a copy of the history and written back only when
//! the turn ends (successfully or with an error), so dropping the future
//! mid-turn leaves the session as it was.

use std::sync::Arc;

use parley_config::SessionConfig;
use parley_core::message::Message;
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse};
use parley_core::tokenizer::TokenCounter;
use tracing::{debug, info};

use crate::answer::{AnswerType, AnswerValue};
use crate::embeddings::EmbeddingSettings;
use crate::error::ContextError;
use crate::registry::SourceRegistry;
use crate::selector::{ContextSelector, SelectedFragment, SelectionMode, render_context, selected_tokens};

/// The system preamble used when the caller only supplies an instruction.
///
/// Selected source text is appended directly after it.
pub fn default_preamble(instruction: &str) -> String {
    format!(
        "You are an assistant talking to a program, so give answers in exactly the requested \
         format with no surrounding punctuation. If you cannot fulfill the request, respond \
         with \"Error: \" followed by a short explanation. {instruction}\n\n\
         You can use the following information in responses:\n\n###\n"
    )
}

/// A history message and its token count.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message: Message,
    pub tokens: usize,
}

/// What a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The assistant's reply text.
    pub reply: String,
    /// The raw completion response.
    pub response: ProviderResponse,
    /// Source fragments placed in the system message, in selection order.
    pub fragments: Vec<SelectedFragment>,
}

/// A single conversation with its own history, budget and sources.
///
/// Not synchronized: calls on one session must be sequential. Forked
/// sessions are independent values and may run concurrently.
#[derive(Clone)]
pub struct ConversationSession {
    provider: Arc<dyn Provider>,
    counter: Arc<dyn TokenCounter>,
    config: SessionConfig,
    preamble: String,
    preamble_tokens: usize,
    history: Vec<HistoryEntry>,
    history_tokens: usize,
    registry: SourceRegistry,
}

impl ConversationSession {
    /// Create a session with an explicit system preamble.
    pub fn new(
        provider: Arc<dyn Provider>,
        counter: Arc<dyn TokenCounter>,
        config: SessionConfig,
        preamble: impl Into<String>,
    ) -> Result<Self, ContextError> {
        let preamble = preamble.into();
        let preamble_tokens = counter.count(&preamble)?;

        Ok(Self {
            provider,
            counter,
            config,
            preamble,
            preamble_tokens,
            history: Vec::new(),
            history_tokens: 0,
            registry: SourceRegistry::new(),
        })
    }

    /// Create a session whose preamble is [`default_preamble`] for `instruction`.
    pub fn with_instruction(
        provider: Arc<dyn Provider>,
        counter: Arc<dyn TokenCounter>,
        config: SessionConfig,
        instruction: &str,
    ) -> Result<Self, ContextError> {
        Self::new(provider, counter, config, default_preamble(instruction))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn preamble_tokens(&self) -> usize {
        self.preamble_tokens
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The running history token count.
    pub fn history_tokens(&self) -> usize {
        self.history_tokens
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SourceRegistry {
        &mut self.registry
    }

    /// Run one turn: select context, ask the completion service, and record
    /// both sides of the exchange.
    ///
    /// On a source or completion error the user turn stays in history and
    /// the assistant turn is never added. Retrying the same prompt therefore
    /// records the user turn twice.
    #[tracing::instrument(skip_all, fields(model = %self.config.model))]
    pub async fn execute_prompt(&mut self, prompt: &str) -> Result<TurnOutcome, ContextError> {
        let mut turn = StagedHistory {
            entries: self.history.clone(),
            tokens: self.history_tokens,
        };

        let limit = self.config.max_history_tokens;
        let used = turn.tokens + self.preamble_tokens;
        if used > limit {
            turn.drop_oldest(used - limit);
        }

        let prompt_tokens = self.counter.count(prompt)?;
        turn.push(Message::user(prompt), prompt_tokens);

        let reserved = turn.tokens + self.preamble_tokens + self.config.max_response_tokens;
        let allowed = self.config.max_total_tokens.saturating_sub(reserved);

        let fragments = match self
            .selector()
            .select(&self.registry, prompt, allowed, self.selection_mode())
            .await
        {
            Ok(fragments) => fragments,
            Err(e) => {
                self.commit(turn);
                return Err(e);
            }
        };

        let system = format!("{}{}", self.preamble, render_context(&fragments));
        debug!(system = %system, "System message");

        let mut messages = Vec::with_capacity(turn.entries.len() + 1);
        messages.push(Message::system(system));
        messages.extend(turn.entries.iter().map(|e| e.message.clone()));

        let request = ProviderRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            top_p: 1.0,
            max_tokens: Some(u32::try_from(self.config.max_response_tokens).unwrap_or(u32::MAX)),
            user: (!self.config.user_id.is_empty()).then(|| self.config.user_id.clone()),
        };

        debug!(prompt, "Sending question");
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                self.commit(turn);
                return Err(ContextError::Completion(e));
            }
        };

        let reply = response.message.content.clone();
        debug!(reply = %reply, "Received answer");
        let reply_tokens = match self.counter.count(&reply) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.commit(turn);
                return Err(e.into());
            }
        };
        turn.push(Message::assistant(reply.clone()), reply_tokens);
        self.commit(turn);

        info!(
            history_tokens = self.history_tokens,
            preamble_tokens = self.preamble_tokens,
            source_tokens = selected_tokens(&fragments),
            allowed_source_tokens = allowed,
            fragments = fragments.len(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply,
            response,
            fragments,
        })
    }

    /// Ask a question and decode the reply as `answer`.
    pub async fn ask(&mut self, prompt: &str, answer: &AnswerType) -> Result<AnswerValue, ContextError> {
        let question = format!("{}{}", answer.instruction()?, prompt);
        let outcome = self.execute_prompt(&question).await?;
        Ok(answer.parse(&outcome.reply)?)
    }

    /// Independent child session with the same config.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Independent child session with an adjusted config.
    ///
    /// ```ignore
    /// let child = session.fork_with(|c| c.with_model("gpt-4").with_max_total_tokens(8000));
    /// ```
    pub fn fork_with(&self, configure: impl FnOnce(SessionConfig) -> SessionConfig) -> Self {
        let mut child = self.clone();
        child.config = configure(child.config);
        child
    }

    /// Replace the history with `messages`.
    ///
    /// The new entries' token counts are added onto the running count, not
    /// substituted for it. Call [`clear_history`](Self::clear_history) first
    /// for an exact count.
    pub fn replace_history(&mut self, messages: Vec<Message>) -> Result<(), ContextError> {
        let mut entries = Vec::with_capacity(messages.len());
        let mut added = 0;
        for message in messages {
            let tokens = self.counter.count(&message.content)?;
            added += tokens;
            entries.push(HistoryEntry { message, tokens });
        }

        self.history = entries;
        self.history_tokens += added;
        Ok(())
    }

    /// Drop all history and reset the token count.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.history_tokens = 0;
    }

    /// Replace the registry with an empty one. History is untouched.
    pub fn purge_sources(&mut self) {
        self.registry = SourceRegistry::new();
    }

    fn selector(&self) -> ContextSelector {
        ContextSelector::new(
            self.counter.clone(),
            self.provider.clone(),
            EmbeddingSettings::from(&self.config),
        )
    }

    fn selection_mode(&self) -> SelectionMode {
        if self.config.use_embeddings {
            SelectionMode::Relevance {
                min_weighted_similarity: self.config.similarity_threshold,
            }
        } else {
            SelectionMode::Weighted
        }
    }

    fn commit(&mut self, turn: StagedHistory) {
        self.history = turn.entries;
        self.history_tokens = turn.tokens;
    }
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("provider", &self.provider.name())
            .field("counter", &self.counter.name())
            .field("config", &self.config)
            .field("preamble_tokens", &self.preamble_tokens)
            .field("history", &self.history.len())
            .field("history_tokens", &self.history_tokens)
            .field("registry", &self.registry)
            .finish()
    }
}

struct StagedHistory {
    entries: Vec<HistoryEntry>,
    tokens: usize,
}

impl StagedHistory {
    fn push(&mut self, message: Message, tokens: usize) {
        self.entries.push(HistoryEntry { message, tokens });
        self.tokens += tokens;
    }

    /// Remove the shortest prefix of history holding at least `excess`
    /// tokens, or everything if there is not that much.
    fn drop_oldest(&mut self, excess: usize) {
        if excess >= self.tokens {
            debug!(excess, history_tokens = self.tokens, "Clearing history");
            self.entries.clear();
            self.tokens = 0;
            return;
        }

        let mut dropped = 0;
        let mut count = 0;
        for entry in &self.entries {
            dropped += entry.tokens;
            count += 1;
            if dropped >= excess {
                break;
            }
        }

        if dropped < excess {
            self.entries.clear();
            self.tokens = 0;
        } else {
            self.entries.drain(..count);
            self.tokens -= dropped;
        }
        debug!(excess, dropped, remaining = self.entries.len(), "Dropped oldest history");
    }
}
