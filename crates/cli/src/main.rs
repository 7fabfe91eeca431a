//! Parley CLI, the main entry point.
//!
//! Commands:
//! - `onboard` : write a starter config
//! - `run`     : serve the Telegram bot
//! - `chat`    : chat in the terminal
//! - `ask`     : answer a single query
//! - `extract` : print the normalized text of a document
//! - `status`  : show the effective configuration
//! - `doctor`  : check the backend and the bot token

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley: a conversational relay for text-generation backends",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.parley/config.toml)
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Onboard,

    /// Serve the Telegram bot
    Run,

    /// Chat in the terminal (`/file <path>` uploads a document)
    Chat,

    /// Answer one query and exit
    Ask {
        /// The query
        query: String,

        /// One-off system prompt template containing {history} and {input}
        #[arg(short, long)]
        prompt: Option<String>,

        /// Print the reply as it is generated
        #[arg(short, long)]
        stream: bool,
    },

    /// Print the normalized text of a .pdf or .txt file
    Extract {
        path: PathBuf,

        /// Also report how many history entries the text would fill
        #[arg(long)]
        chunks: bool,
    },

    /// Show the effective configuration
    Status,

    /// Check backend and transport health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config).await?,
        Commands::Run => commands::run::run(config).await?,
        Commands::Chat => commands::chat::run(config).await?,
        Commands::Ask {
            query,
            prompt,
            stream,
        } => commands::ask::run(config, &query, prompt, stream).await?,
        Commands::Extract { path, chunks } => commands::extract::run(config, &path, chunks).await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
    }

    Ok(())
}
