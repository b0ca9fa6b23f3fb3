// LogLens CLI - natural language Q&A over log files

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use loglens_core::ProviderKind;
use loglens_providers::ProviderConfig;
use loglens_rag::LogLensEngine;

const DEFAULT_CONFIG: &str = "./config/loglens.toml";

#[derive(Parser)]
#[command(name = "loglens")]
#[command(version = "0.1.0")]
#[command(about = "Ask questions about your logs", long_about = None)]
struct Cli {
    /// Path to the provider config file
    #[arg(short, long, default_value = DEFAULT_CONFIG, env = "LOGLENS_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the vector index for a corpus from log files
    Index {
        /// Corpus name the logs are stored under
        corpus: String,

        /// Log file to index
        file: String,
    },

    /// Ask a question against an indexed corpus
    Ask {
        /// Your question in natural language
        question: String,

        /// Corpus to query
        #[arg(short = 'C', long, default_value = "default")]
        corpus: String,
    },

    /// List selectable provider backends
    Providers,

    /// List locally available models for a backend
    Models {
        /// Backend kind (local, ollama)
        kind: String,
    },

    /// Switch the active generation backend
    Select {
        /// Backend kind (local, ollama, openai_compat, dashscope)
        kind: String,

        /// Model to use (backend default when omitted)
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // credentials may live in api_key.env or .env
    dotenvy::from_filename("api_key.env").ok();
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = ProviderConfig::load(&cli.config)?;
    info!(config = %cli.config, "Config loaded");
    let engine = LogLensEngine::new(config)?;

    match cli.command {
        Commands::Index { corpus, file } => {
            let raw_logs = std::fs::read_to_string(&file)?;
            println!("{}", format!("Indexing {} into '{}'...", file, corpus).dimmed());
            let chunks = engine.rebuild_index(&corpus, &raw_logs).await?;
            println!("{} {} chunks indexed", "done:".green().bold(), chunks);
        }

        Commands::Ask { question, corpus } => {
            let result = engine.answer(&question, &corpus).await?;
            println!("{}", "Answer".bold().underline());
            for (i, part) in result.answer.parts.iter().enumerate() {
                println!("  {}. {}", i + 1, part);
            }
            println!(
                "{}",
                format!(
                    "({} source logs, provider: {})",
                    result.sources_count, result.provider
                )
                .dimmed()
            );
        }

        Commands::Providers => {
            for kind in engine.list_providers() {
                println!("{}", kind);
            }
        }

        Commands::Models { kind } => {
            let kind = parse_kind(&kind)?;
            let models = engine.list_local_models(kind).await;
            if models.is_empty() {
                println!("{}", "no local models found".yellow());
            }
            for model in models {
                println!("{}", model);
            }
        }

        Commands::Select { kind, model } => {
            let kind = parse_kind(&kind)?;
            let (active_kind, active_model) =
                engine.select_provider(kind, model.as_deref())?;
            println!(
                "{} {} / {}",
                "active:".green().bold(),
                active_kind,
                active_model
            );
        }
    }

    Ok(())
}

fn parse_kind(s: &str) -> Result<ProviderKind, Box<dyn std::error::Error>> {
    ProviderKind::from_str(s).ok_or_else(|| format!("unknown provider kind: {}", s).into())
}
