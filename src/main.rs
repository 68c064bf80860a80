use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docs_rag::Result;
use docs_rag::commands::{ingest, serve_ask, serve_slack, show_config};
use docs_rag::config::Config;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Retrieval-augmented question answering over indexed documentation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed, and upsert a document into the vector store
    Ingest {
        /// Path to the Markdown document to ingest
        #[arg(default_value = "docs/auth_service_doc.md")]
        file: PathBuf,
        /// Override the maximum chunk size in characters
        #[arg(long)]
        max_chunk_size: Option<usize>,
    },
    /// Start the HTTP ask endpoint on port 8000
    Serve,
    /// Start the Slack events server
    Slack,
    /// Show the resolved configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Ingest {
            file,
            max_chunk_size,
        } => {
            if let Some(size) = max_chunk_size {
                config.ingest.max_chunk_size = size;
            }
            ingest(&config, &file).await?;
        }
        Commands::Serve => {
            serve_ask(&config).await?;
        }
        Commands::Slack => {
            serve_slack(&config).await?;
        }
        Commands::Config => {
            show_config(&config);
        }
    }

    Ok(())
}
