// Configuration management module
// All options come from the process environment; there is no config file.

#[cfg(test)]
mod tests;

use std::env;

use anyhow::{Context, Result};
use thiserror::Error;
use url::Url;

use crate::chunking::DEFAULT_MAX_CHUNK_SIZE;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_SLACK_PORT: u16 = 3000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_EMBED_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub pinecone: PineconeConfig,
    /// Present only when both Slack variables are set; the `slack` command
    /// requires it, `ingest` and `serve` do not.
    pub slack: Option<SlackConfig>,
    pub retry: RetryConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PineconeConfig {
    pub api_key: String,
    /// Data-plane host of the index, with or without an https:// prefix.
    pub index_host: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlackConfig {
    pub bot_token: String,
    pub signing_secret: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    #[inline]
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub max_chunk_size: usize,
    pub embed_concurrency: usize,
}

impl Default for IngestConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(&'static str, String),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid embed concurrency: {0} (must be between 1 and 64)")]
    InvalidEmbedConcurrency(usize),
    #[error("Invalid max chunk size: {0} (must be at least 1)")]
    InvalidMaxChunkSize(usize),
}

impl Config {
    /// Load configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok()).context("Configuration validation failed")
    }

    /// Load configuration from an arbitrary variable source. Extracted from
    /// [`Config::from_env`] so tests can inject variables without touching
    /// process state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai = OpenAiConfig {
            api_key: required(&lookup, "OPENAI_API_KEY")?,
            base_url: optional(&lookup, "OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            embedding_model: optional(&lookup, "OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: optional(&lookup, "OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        };

        let pinecone = PineconeConfig {
            api_key: required(&lookup, "PINECONE_API_KEY")?,
            index_host: with_scheme(required(&lookup, "PINECONE_INDEX_HOST")?),
        };

        let slack = match (
            optional(&lookup, "SLACK_BOT_TOKEN"),
            optional(&lookup, "SLACK_SIGNING_SECRET"),
        ) {
            (Some(bot_token), Some(signing_secret)) => Some(SlackConfig {
                bot_token,
                signing_secret,
                port: parse_or(&lookup, "PORT", DEFAULT_SLACK_PORT)?,
            }),
            _ => None,
        };

        let retry = RetryConfig {
            attempts: parse_or(&lookup, "RAG_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?,
            base_delay_ms: parse_or(
                &lookup,
                "RAG_RETRY_BASE_DELAY_MS",
                DEFAULT_RETRY_BASE_DELAY_MS,
            )?,
        };

        let ingest = IngestConfig {
            max_chunk_size: parse_or(&lookup, "RAG_MAX_CHUNK_SIZE", DEFAULT_MAX_CHUNK_SIZE)?,
            embed_concurrency: parse_or(
                &lookup,
                "RAG_EMBED_CONCURRENCY",
                DEFAULT_EMBED_CONCURRENCY,
            )?,
        };

        let config = Self {
            openai,
            pinecone,
            slack,
            retry,
            ingest,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.openai.base_url)
            .map_err(|_| ConfigError::InvalidUrl("OPENAI_BASE_URL", self.openai.base_url.clone()))?;

        Url::parse(&self.pinecone.index_host).map_err(|_| {
            ConfigError::InvalidUrl("PINECONE_INDEX_HOST", self.pinecone.index_host.clone())
        })?;

        if self.retry.attempts == 0 || self.retry.attempts > 10 {
            return Err(ConfigError::InvalidRetryAttempts(self.retry.attempts));
        }

        if self.ingest.embed_concurrency == 0 || self.ingest.embed_concurrency > 64 {
            return Err(ConfigError::InvalidEmbedConcurrency(
                self.ingest.embed_concurrency,
            ));
        }

        if self.ingest.max_chunk_size == 0 {
            return Err(ConfigError::InvalidMaxChunkSize(self.ingest.max_chunk_size));
        }

        Ok(())
    }

    /// Human-readable rendering of the resolved configuration with secrets
    /// masked, for the `config` command.
    pub fn redacted(&self) -> String {
        let mut out = String::new();
        out.push_str("OpenAI:\n");
        out.push_str(&format!("  base URL: {}\n", self.openai.base_url));
        out.push_str(&format!(
            "  embedding model: {}\n",
            self.openai.embedding_model
        ));
        out.push_str(&format!("  chat model: {}\n", self.openai.chat_model));
        out.push_str(&format!("  API key: {}\n", mask(&self.openai.api_key)));
        out.push_str("Pinecone:\n");
        out.push_str(&format!("  index host: {}\n", self.pinecone.index_host));
        out.push_str(&format!("  API key: {}\n", mask(&self.pinecone.api_key)));
        match &self.slack {
            Some(slack) => {
                out.push_str("Slack:\n");
                out.push_str(&format!("  port: {}\n", slack.port));
                out.push_str(&format!("  bot token: {}\n", mask(&slack.bot_token)));
                out.push_str(&format!(
                    "  signing secret: {}\n",
                    mask(&slack.signing_secret)
                ));
            }
            None => out.push_str("Slack: not configured\n"),
        }
        out.push_str(&format!(
            "Retry: {} attempts, base delay {}ms\n",
            self.retry.attempts, self.retry.base_delay_ms
        ));
        out.push_str(&format!(
            "Ingest: max chunk size {}, embed concurrency {}\n",
            self.ingest.max_chunk_size, self.ingest.embed_concurrency
        ));
        out
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match optional(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        None => Ok(default),
    }
}

/// Pinecone index hosts are usually given bare; default them to https.
fn with_scheme(host: String) -> String {
    if host.contains("://") {
        host
    } else {
        format!("https://{host}")
    }
}

fn mask(secret: &str) -> String {
    if secret.chars().count() < 8 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(secret.chars().count() - 4).collect();
    format!("****{tail}")
}
