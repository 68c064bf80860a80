// RAG query pipeline
// One request = embed the question, pull the nearest chunks, hand both to
// the chat model. Clients are constructed once at process start and
// injected here.


use anyhow::{Context, Result};
use tracing::debug;

use crate::openai::OpenAiClient;
use crate::pinecone::{NAMESPACE, PineconeClient, ScoredMatch};

/// Number of nearest chunks retrieved per query. Every match is used as
/// context; there is no score threshold.
pub const TOP_K: usize = 3;

pub struct RagPipeline {
    openai: OpenAiClient,
    pinecone: PineconeClient,
}

impl RagPipeline {
    #[inline]
    pub fn new(openai: OpenAiClient, pinecone: PineconeClient) -> Self {
        Self { openai, pinecone }
    }

    /// Embed the query and return the concatenated texts of the nearest
    /// stored chunks.
    #[inline]
    pub async fn retrieve_context(&self, query: &str) -> Result<String> {
        let vector = self
            .openai
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let matches = self
            .pinecone
            .query(NAMESPACE, &vector, TOP_K)
            .await
            .context("Failed to query vector store")?;

        debug!("Retrieved {} matches for query", matches.len());

        Ok(join_matches(matches))
    }

    /// Answer a question: retrieve context, build the prompt, complete.
    #[inline]
    pub async fn answer(&self, query: &str) -> Result<String> {
        let context = self.retrieve_context(query).await?;
        let prompt = build_prompt(query, &context);

        self.openai
            .complete(&prompt)
            .await
            .context("Failed to generate answer")
    }
}

/// Concatenate match texts, in store order, with newline separators.
fn join_matches(matches: Vec<ScoredMatch>) -> String {
    matches
        .into_iter()
        .filter_map(|scored| scored.metadata.map(|metadata| metadata.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The fixed single-turn prompt fed to the chat model.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You're a helpful assistant for developers reading a codebase.\n\nContext:\n{context}\n\nQ: {query}\nA:"
    )
}
