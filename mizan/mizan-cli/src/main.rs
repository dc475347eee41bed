//! Mizan CLI - grounded question answering over regulatory documents.
//!
//! # Usage
//!
//! ```bash
//! # Index documents under a source label
//! mizan ingest --source AAOIFI standards/*.pdf
//!
//! # Ask a question, answering in Malay
//! mizan ask "What is Murabaha?" --lang ms
//!
//! # Inspect state
//! mizan documents
//! mizan config --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use mizan_cli::commands::{self, AskOptions};
use mizan_cli::{OutputFormat, output};
use mizan_core::config::MizanConfig;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "mizan")]
#[command(about = "Mizan - grounded answers from Islamic finance standards", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MIZAN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, chunk, embed and index documents
    Ingest {
        /// Files to ingest (PDF or plain text)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Source label attached to every chunk (e.g. AAOIFI, BNM)
        #[arg(short, long)]
        source: String,
    },

    /// Ask a question against the indexed sources
    Ask {
        /// The question, in Arabic, English or Malay
        question: String,

        /// Response language (ar, en, ms); defaults to the question's language
        #[arg(short, long)]
        lang: Option<String>,

        /// Generation backend (local, hosted)
        #[arg(short, long)]
        backend: Option<String>,

        /// Only retrieve chunks from this source label
        #[arg(long)]
        source: Option<String>,

        /// Only retrieve chunks in this language (ar, en, ms)
        #[arg(long)]
        language: Option<String>,
    },

    /// List ingested documents
    Documents,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = MizanConfig::load_or_default(cli.config.as_deref()).await?;

    init_logging(cli.verbose, &config.general.log_level);

    let format = OutputFormat::from_flag(cli.json);

    match cli.command {
        Commands::Ingest { files, source } => {
            commands::ingest(config, files, source, format).await?;
        }

        Commands::Ask {
            question,
            lang,
            backend,
            source,
            language,
        } => {
            let options = AskOptions {
                response_language: lang,
                backend,
                source,
                language,
            };
            commands::ask(config, question, options, format).await?;
        }

        Commands::Documents => {
            commands::documents(config, format).await?;
        }

        Commands::Config => {
            commands::show_config(&config, format)?;
        }
    }

    Ok(())
}

fn crate_directives(level: &str) -> String {
    ["mizan", "mizan_core", "mizan_ingestion", "mizan_semantic", "mizan_cli"]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_logging(verbose: bool, level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new(format!("{},info", crate_directives("debug")))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},warn", crate_directives(level))))
    };

    // stdout is reserved for command output
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
