// Ingestion driver
// One-shot batch job: document -> chunks -> embeddings -> vector records ->
// upsert. Runs to completion or fails; no partial-resume state is kept.


use std::path::Path;

use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt, stream};
use indicatif::ProgressBar;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::chunking::split_into_chunks;
use crate::config::IngestConfig;
use crate::openai::OpenAiClient;
use crate::pinecone::{NAMESPACE, PineconeClient, VectorMetadata, VectorRecord};

pub struct Ingestor {
    openai: OpenAiClient,
    pinecone: PineconeClient,
    config: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub chunks: usize,
    pub upserted: usize,
}

impl Ingestor {
    #[inline]
    pub fn new(openai: OpenAiClient, pinecone: PineconeClient, config: IngestConfig) -> Self {
        Self {
            openai,
            pinecone,
            config,
        }
    }

    /// Read a UTF-8 document from disk and ingest it.
    #[inline]
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestionReport> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read document: {}", path.display()))?;

        info!("Loaded document {} ({} chars)", path.display(), text.len());

        self.ingest_text(&text).await
    }

    /// Chunk, embed, and upsert a document body.
    #[inline]
    pub async fn ingest_text(&self, text: &str) -> Result<IngestionReport> {
        let chunks = split_into_chunks(text, self.config.max_chunk_size);
        info!("Split document into {} chunks", chunks.len());

        if chunks.is_empty() {
            return Ok(IngestionReport {
                chunks: 0,
                upserted: 0,
            });
        }

        // Embed with bounded concurrency; `buffered` keeps results in chunk
        // order so ids line up with positions.
        let progress = ProgressBar::new(chunks.len() as u64);
        let embeddings: Vec<Vec<f32>> = stream::iter(chunks.iter().map(|chunk| {
            let progress = progress.clone();
            async move {
                let embedding = self.openai.embed(chunk).await?;
                progress.inc(1);
                Ok::<_, anyhow::Error>(embedding)
            }
        }))
        .buffered(self.config.embed_concurrency)
        .try_collect()
        .await
        .context("Failed to generate chunk embeddings")?;
        progress.finish_and_clear();

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (chunk, values))| VectorRecord {
                id: vector_id(NAMESPACE, index, chunk),
                values,
                metadata: VectorMetadata {
                    text: chunk.clone(),
                },
            })
            .collect();

        let upserted = self
            .pinecone
            .upsert(NAMESPACE, &records)
            .await
            .context("Failed to upsert vectors")?;

        if upserted != records.len() {
            warn!(
                "Store reported {} upserted for {} records",
                upserted,
                records.len()
            );
        }

        info!("Upserted {} vectors into namespace {}", upserted, NAMESPACE);

        Ok(IngestionReport {
            chunks: chunks.len(),
            upserted,
        })
    }
}

/// Deterministic record id: a content hash over namespace, chunk position,
/// and chunk text. Re-running ingestion over the same document produces the
/// same ids, so re-runs overwrite in place instead of accumulating.
#[inline]
pub fn vector_id(namespace: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0]);
    hasher.update(index.to_be_bytes());
    hasher.update([0]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    format!("auth-{}", hex::encode(&digest[..8]))
}
