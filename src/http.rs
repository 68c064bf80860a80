// Shared JSON-over-HTTP plumbing for the external collaborator clients.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::RetryConfig;

pub(crate) const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// POST a JSON body and deserialize the JSON response, retrying transient
/// failures under the given policy.
///
/// Retries cover 429, 5xx, and transport errors; any other non-success
/// status fails immediately with the response body in the error.
pub(crate) async fn post_json<B, T>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    retry: &RetryConfig,
) -> Result<T>
where
    B: Serialize + Sync,
    T: DeserializeOwned,
{
    let mut last_error = None;

    for attempt in 1..=retry.attempts {
        debug!("HTTP request attempt {}/{} to {}", attempt, retry.attempts, url);

        match client.post(url).json(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<T>()
                        .await
                        .context("Failed to parse response body");
                }

                if !is_retryable_status(status) {
                    let detail = response.text().await.unwrap_or_default();
                    warn!("Client error (status {}), not retrying", status);
                    return Err(anyhow!("Client error: HTTP {status}: {detail}"));
                }

                warn!(
                    "Server error (status {}), attempt {}/{}",
                    status, attempt, retry.attempts
                );
                last_error = Some(anyhow!("Server error: HTTP {status}"));
            }
            Err(transport_error) => {
                if !is_retryable_error(&transport_error) {
                    return Err(anyhow!("Non-retryable error: {transport_error}"));
                }
                warn!(
                    "Transport error: {}, attempt {}/{}",
                    transport_error, attempt, retry.attempts
                );
                last_error = Some(anyhow!("Request error: {transport_error}"));
            }
        }

        if attempt < retry.attempts {
            let delay =
                Duration::from_millis(retry.base_delay_ms * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1));
            debug!("Waiting {:?} before retry", delay);
            sleep(delay).await;
        }
    }

    error!("All retry attempts failed for request to {}", url);

    Err(last_error.unwrap_or_else(|| anyhow!("Request failed after retries")))
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
