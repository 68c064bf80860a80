// Slack front-end
// Events API endpoint plus the outbound chat.postMessage client. Every
// inbound request is signature-checked, acknowledged immediately, and the
// RAG work runs in a detached task so Slack's ack deadline is met.


use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::RagError;
use crate::http;
use crate::rag::RagPipeline;

type HmacSha256 = Hmac<Sha256>;

const SLACK_API_BASE_URL: &str = "https://slack.com/api";

/// Requests with a timestamp further than this from our clock are replays
/// or clock skew; either way they are rejected.
const REPLAY_WINDOW_SECONDS: i64 = 300;

const THINKING_MESSAGE: &str = "\u{1f914} Thinking...";
const APOLOGY_MESSAGE: &str =
    "\u{26a0}\u{fe0f} Sorry, something went wrong while answering your question.";

// Addressed-user marker, e.g. "<@U123ABC>" at the front of a mention.
static MENTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[^>]+>").expect("mention pattern is valid"));

#[derive(Clone)]
pub struct SlackState {
    pub rag: Arc<RagPipeline>,
    pub slack: SlackClient,
    pub signing_secret: String,
}

/// Outbound Slack Web API client.
#[derive(Debug, Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackClient {
    #[inline]
    pub fn new(bot_token: &str) -> Result<Self> {
        Self::with_base_url(bot_token, SLACK_API_BASE_URL)
    }

    /// Build a client against an alternate API base; used by tests to point
    /// at a mock server.
    #[inline]
    pub fn with_base_url(bot_token: &str, base_url: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {bot_token}"))
            .context("Slack bot token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http::DEFAULT_TIMEOUT_SECONDS))
            .default_headers(headers)
            .build()
            .context("Failed to build Slack HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Post a message into a channel. Slack reports API failures with a
    /// 200 carrying `"ok": false`, so both layers are checked.
    #[inline]
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let request = PostMessageRequest { channel, text };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Slack API")?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Slack(format!("Slack API returned HTTP {status}")).into());
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .context("Failed to parse Slack API response")?;

        if !body.ok {
            return Err(RagError::Slack(format!(
                "Slack API error: {}",
                body.error.unwrap_or_else(|| "unknown".to_string())
            ))
            .into());
        }

        Ok(())
    }
}

/// Inbound Events API envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventEnvelope {
    UrlVerification { challenge: String },
    EventCallback { event: SlackEvent },
    #[serde(other)]
    Other,
}

/// The subscribed event types. Anything else deserializes to `Other` and is
/// acknowledged without action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    AppMention {
        channel: String,
        text: String,
        #[serde(default)]
        bot_id: Option<String>,
    },
    Message {
        channel: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        channel_type: Option<String>,
        #[serde(default)]
        bot_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Check the v0 signing-secret signature over the raw request body.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
) -> bool {
    let Some(hex_signature) = signature.strip_prefix("v0=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };

    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);

    mac.verify_slice(&expected).is_ok()
}

fn timestamp_is_fresh(timestamp: &str, now: i64) -> bool {
    timestamp
        .parse::<i64>()
        .map(|ts| (now - ts).abs() <= REPLAY_WINDOW_SECONDS)
        .unwrap_or(false)
}

/// Strip the first addressed-user marker and surrounding whitespace from a
/// mention text, leaving the bare question.
pub fn strip_mention(text: &str) -> String {
    MENTION_MARKER.replace(text, "").trim().to_string()
}

async fn events(
    State(state): State<Arc<SlackState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let timestamp = header_str(&headers, "x-slack-request-timestamp");
    let signature = header_str(&headers, "x-slack-signature");
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        warn!("Rejected Slack request without signature headers");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if !timestamp_is_fresh(timestamp, Utc::now().timestamp())
        || !verify_signature(&state.signing_secret, timestamp, &body, signature)
    {
        warn!("Rejected Slack request with invalid signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(parse_error) => {
            warn!("Unparseable Slack event payload: {}", parse_error);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            Json(serde_json::json!({"challenge": challenge})).into_response()
        }
        EventEnvelope::EventCallback { event } => {
            // Ack within Slack's deadline; the pipeline runs detached.
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                handle_event(&state, event).await;
            });
            StatusCode::OK.into_response()
        }
        EventEnvelope::Other => StatusCode::OK.into_response(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn handle_event(state: &SlackState, event: SlackEvent) {
    match event {
        SlackEvent::AppMention {
            channel,
            text,
            bot_id,
        } => {
            if bot_id.is_some() {
                return;
            }
            let query = strip_mention(&text);
            debug!("Handling mention in {}: {}", channel, query);
            respond(state, &channel, &query).await;
        }
        SlackEvent::Message {
            channel,
            text,
            channel_type,
            bot_id,
        } => {
            // Only direct messages, and never our own posts.
            if bot_id.is_some() || channel_type.as_deref() != Some("im") {
                return;
            }
            let Some(text) = text else {
                return;
            };
            let query = text.trim().to_string();
            debug!("Handling direct message in {}: {}", channel, query);
            respond(state, &channel, &query).await;
        }
        SlackEvent::Other => {}
    }
}

async fn respond(state: &SlackState, channel: &str, query: &str) {
    if let Err(pipeline_error) = try_respond(state, channel, query).await {
        error!("Slack handler error: {:#}", pipeline_error);
        if let Err(post_error) = state.slack.post_message(channel, APOLOGY_MESSAGE).await {
            error!("Failed to post apology message: {:#}", post_error);
        }
    }
}

async fn try_respond(state: &SlackState, channel: &str, query: &str) -> Result<()> {
    state.slack.post_message(channel, THINKING_MESSAGE).await?;

    let answer = state.rag.answer(query).await?;

    state
        .slack
        .post_message(channel, &format!("\u{1f4a1} *Answer:* {answer}"))
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Build the events router. Split from [`serve`] so tests can bind it to an
/// ephemeral port.
pub fn build_router(state: Arc<SlackState>) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the Slack events endpoint until the process exits.
pub async fn serve(
    rag: RagPipeline,
    slack: SlackClient,
    signing_secret: String,
    port: u16,
) -> Result<()> {
    let state = Arc::new(SlackState {
        rag: Arc::new(rag),
        slack,
        signing_secret,
    });
    let app = build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("\u{26a1} Slack events endpoint live on port {}", port);

    axum::serve(listener, app)
        .await
        .context("Slack server terminated")?;

    Ok(())
}
