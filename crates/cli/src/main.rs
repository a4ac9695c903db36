//! parley CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive or single-message chat over text-file sources
//! - `tokens`: Count (and optionally chunk) a file's tokens
//! - `init`: Write a starter config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod file_source;

use file_source::SourceArg;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "parley: token-budgeted conversations over weighted sources",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// HuggingFace tokenizer (tokenizer.json path or hub repo); needs the `hf` feature
    #[arg(long, global = true, env = "PARLEY_TOKENIZER")]
    tokenizer: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Text file to draw context from, optionally weighted (PATH[:WEIGHT])
        #[arg(short, long = "source", value_name = "PATH[:WEIGHT]")]
        sources: Vec<SourceArg>,

        /// Rank source paragraphs by embedding similarity to the prompt
        #[arg(long)]
        relevance: bool,

        /// Print which source fragments were used for each reply
        #[arg(long)]
        show_sources: bool,
    },

    /// Count the tokens in a file
    Tokens {
        path: PathBuf,

        /// Also split the file into chunks of at most N tokens
        #[arg(long, value_name = "N")]
        chunk: Option<usize>,
    },

    /// Write a default config to ~/.parley/config.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let counter = commands::token_counter(cli.tokenizer.as_deref())?;

    match cli.command {
        Commands::Chat {
            message,
            sources,
            relevance,
            show_sources,
        } => {
            let args = commands::chat::ChatArgs {
                message,
                sources,
                relevance,
                show_sources,
            };
            commands::chat::run(args, counter).await?
        }
        Commands::Tokens { path, chunk } => commands::tokens::run(&path, chunk, counter.as_ref())?,
        Commands::Init { force } => commands::init::run(force)?,
    }

    Ok(())
}
