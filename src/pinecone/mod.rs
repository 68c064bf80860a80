// Pinecone client
// External collaborator persisting chunk vectors under a namespace and
// answering nearest-neighbor queries.


use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{PineconeConfig, RetryConfig};
use crate::http;

/// Logical partition isolating this document's vectors from everything else
/// in the index. Fixed; never parameterized.
pub const NAMESPACE: &str = "auth-docs";

#[derive(Debug, Clone)]
pub struct PineconeClient {
    client: reqwest::Client,
    index_host: String,
    retry: RetryConfig,
}

/// One stored vector: id, embedding values, and the chunk text carried as
/// metadata so retrieval can reconstruct the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub text: String,
}

/// A query match, ordered by the store's descending similarity score.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<VectorMetadata>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount")]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredMatch>,
}

impl PineconeClient {
    #[inline]
    pub fn new(config: &PineconeConfig, retry: RetryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(&config.api_key)
            .context("Pinecone API key is not a valid header value")?;
        api_key.set_sensitive(true);
        headers.insert("Api-Key", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http::DEFAULT_TIMEOUT_SECONDS))
            .default_headers(headers)
            .build()
            .context("Failed to build Pinecone HTTP client")?;

        Ok(Self {
            client,
            index_host: config.index_host.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Upsert records into the namespace, returning the store's reported
    /// count. No transactionality across records.
    #[inline]
    pub async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<usize> {
        debug!(
            "Upserting {} vectors into namespace {}",
            vectors.len(),
            namespace
        );

        let url = format!("{}/vectors/upsert", self.index_host);
        let request = UpsertRequest { vectors, namespace };

        let response: UpsertResponse = http::post_json(&self.client, &url, &request, &self.retry)
            .await
            .context("Failed to upsert vectors")?;

        Ok(response.upserted_count)
    }

    /// Nearest-neighbor search over the namespace, metadata included,
    /// ordered by descending similarity score.
    #[inline]
    pub async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>> {
        debug!("Querying namespace {} for top {}", namespace, top_k);

        let url = format!("{}/query", self.index_host);
        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata: true,
        };

        let response: QueryResponse = http::post_json(&self.client, &url, &request, &self.retry)
            .await
            .context("Failed to query vectors")?;

        debug!("Query returned {} matches", response.matches.len());

        Ok(response.matches)
    }
}
