// OpenAI client
// Covers both external collaborators that live behind the same API surface:
// the embedding model and the chat-completion answer generator.


use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RagError;
use crate::config::{OpenAiConfig, RetryConfig};
use crate::http;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig, retry: RetryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .context("OpenAI API key is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http::DEFAULT_TIMEOUT_SECONDS))
            .default_headers(headers)
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            retry,
        })
    }

    /// Embed a single text into a fixed-length vector.
    #[inline]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let response: EmbeddingResponse =
            http::post_json(&self.client, &url, &request, &self.retry)
                .await
                .context("Failed to generate embedding")?;

        let data = response.data.into_iter().next().ok_or_else(|| {
            RagError::Embedding("Embedding response contained no data".to_string())
        })?;

        debug!("Generated embedding with {} dimensions", data.embedding.len());

        Ok(data.embedding)
    }

    /// Run a single-turn chat completion over the given prompt. No
    /// conversation state is kept between calls.
    #[inline]
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Requesting completion for prompt (length: {})", prompt.len());

        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: ChatResponse = http::post_json(&self.client, &url, &request, &self.retry)
            .await
            .context("Failed to generate completion")?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            RagError::Completion("Completion response contained no choices".to_string())
        })?;

        Ok(choice.message.content)
    }
}
