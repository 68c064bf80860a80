use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::RagError;
use crate::config::Config;
use crate::ingest::Ingestor;
use crate::openai::OpenAiClient;
use crate::pinecone::PineconeClient;
use crate::rag::RagPipeline;
use crate::server;
use crate::slack::{self, SlackClient};

/// Chunk, embed, and upsert a document into the vector store.
#[inline]
pub async fn ingest(config: &Config, file: &Path) -> Result<()> {
    info!("Ingesting document: {}", file.display());

    let openai = OpenAiClient::new(&config.openai, config.retry.clone())?;
    let pinecone = PineconeClient::new(&config.pinecone, config.retry.clone())?;
    let ingestor = Ingestor::new(openai, pinecone, config.ingest.clone());

    let report = ingestor.ingest_file(file).await?;

    println!("Total chunks created: {}", report.chunks);
    println!("Upserted {} vectors to Pinecone", report.upserted);

    Ok(())
}

/// Start the HTTP ask endpoint.
#[inline]
pub async fn serve_ask(config: &Config) -> Result<()> {
    let rag = build_pipeline(config)?;
    server::serve(rag).await
}

/// Start the Slack events server.
#[inline]
pub async fn serve_slack(config: &Config) -> Result<()> {
    let slack_config = config.slack.as_ref().ok_or_else(|| {
        RagError::Config(
            "SLACK_BOT_TOKEN and SLACK_SIGNING_SECRET must be set for the slack command"
                .to_string(),
        )
    })?;

    let rag = build_pipeline(config)?;
    let client = SlackClient::new(&slack_config.bot_token)?;

    slack::serve(
        rag,
        client,
        slack_config.signing_secret.clone(),
        slack_config.port,
    )
    .await
}

/// Print the resolved configuration with secrets masked.
#[inline]
pub fn show_config(config: &Config) {
    print!("{}", config.redacted());
}

fn build_pipeline(config: &Config) -> Result<RagPipeline> {
    let openai = OpenAiClient::new(&config.openai, config.retry.clone())?;
    let pinecone = PineconeClient::new(&config.pinecone, config.retry.clone())?;
    Ok(RagPipeline::new(openai, pinecone))
}
