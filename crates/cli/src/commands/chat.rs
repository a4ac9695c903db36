//! `parley chat`: interactive or single-message conversation.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use parley_config::AppConfig;
use parley_context::{ConversationSession, SourceOptions, TurnOutcome};
use parley_core::tokenizer::TokenCounter;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::file_source::{FileSource, SourceArg};

pub struct ChatArgs {
    pub message: Option<String>,
    pub sources: Vec<SourceArg>,
    pub relevance: bool,
    pub show_sources: bool,
}

pub async fn run(args: ChatArgs, counter: Arc<dyn TokenCounter>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    if args.relevance {
        config.session.use_embeddings = true;
    }

    let provider = parley_providers::build_from_config(&config).with_context(|| {
        format!(
            "Set an API key in {} or export PARLEY_API_KEY",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;

    let instruction = if config.instruction.is_empty() {
        "Answer the user's questions helpfully and concisely."
    } else {
        config.instruction.as_str()
    };
    let mut session =
        ConversationSession::with_instruction(provider, counter, config.session.clone(), instruction)?;

    for source in &args.sources {
        let file = FileSource::new(&source.path);
        debug!(path = %file.path().display(), weight = source.weight, "Registering file source");
        session
            .registry_mut()
            .register_text_source(file, SourceOptions::weighted(source.weight));
    }

    if let Some(message) = args.message {
        let outcome = session.execute_prompt(&message).await?;
        print_outcome(&outcome, args.show_sources);
        return Ok(());
    }

    println!();
    println!("  parley: interactive chat");
    println!("  Model:    {}", session.config().model);
    println!(
        "  Budget:   {} total / {} reply / {} history tokens",
        session.config().max_total_tokens,
        session.config().max_response_tokens,
        session.config().max_history_tokens
    );
    println!(
        "  Sources:  {} ({})",
        session.registry().len(),
        if session.config().use_embeddings { "by relevance" } else { "by weight" }
    );
    println!();
    println!("  Type 'exit' or press Ctrl+D to quit, '/clear' to reset history.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                session.clear_history();
                println!("  (history cleared)");
                continue;
            }
            _ => {}
        }

        match session.execute_prompt(line).await {
            Ok(outcome) => {
                println!();
                print_outcome(&outcome, args.show_sources);
                println!();
            }
            Err(e) => eprintln!("  [Error] {e}"),
        }
    }

    println!();
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome, show_sources: bool) {
    for line in outcome.reply.lines() {
        println!("  Assistant > {line}");
    }

    if show_sources && !outcome.fragments.is_empty() {
        println!("  Sources:");
        for used in &outcome.fragments {
            let score = used
                .score
                .map(|s| format!(" score {s:.3}"))
                .unwrap_or_default();
            println!(
                "    - {} ({} tokens{score})",
                used.source,
                used.fragment.token_count()
            );
        }
    }
}
