//! Slack Web API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{ChatTransport, TransportError, TransportResult};

/// Slack client configuration.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Base URL for the Web API.
    pub api_base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://slack.com/api".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Response envelope common to all Web API methods.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Map the `ok`/`error` envelope to a transport result.
fn envelope_result(envelope: ApiEnvelope) -> TransportResult<()> {
    if envelope.ok {
        return Ok(());
    }
    match envelope.error.as_deref() {
        Some("ratelimited") | Some("rate_limited") => Err(TransportError::RateLimited {
            retry_after_secs: None,
        }),
        Some(error) => Err(TransportError::Api(error.to_string())),
        None => Err(TransportError::Api("unknown error".to_string())),
    }
}

fn map_request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Slack Web API transport.
///
/// Drives `chat.postMessage` and `chat.postEphemeral` with bearer
/// authentication.
pub struct SlackClient {
    config: SlackConfig,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    async fn post(
        &self,
        bot_token: &str,
        method: &str,
        body: serde_json::Value,
    ) -> TransportResult<()> {
        let url = format!("{}/{}", self.config.api_base_url, method);
        debug!(method, "Posting to chat API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(bot_token)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(TransportError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!("HTTP {status}: {body}")));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| TransportError::Network(format!("invalid API response: {e}")))?;
        envelope_result(envelope)
    }
}

#[async_trait]
impl ChatTransport for SlackClient {
    async fn send_channel_text(
        &self,
        bot_token: &str,
        channel_id: &str,
        text: &str,
    ) -> TransportResult<()> {
        let body = json!({ "channel": channel_id, "text": text });
        self.post(bot_token, "chat.postMessage", body).await
    }

    async fn send_channel_blocks(
        &self,
        bot_token: &str,
        channel_id: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> TransportResult<()> {
        let body = json!({ "channel": channel_id, "blocks": blocks, "text": fallback_text });
        self.post(bot_token, "chat.postMessage", body).await
    }

    async fn send_ephemeral_text(
        &self,
        bot_token: &str,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> TransportResult<()> {
        let body = json!({ "channel": channel_id, "user": user_id, "text": text });
        self.post(bot_token, "chat.postEphemeral", body).await
    }

    async fn send_ephemeral_blocks(
        &self,
        bot_token: &str,
        channel_id: &str,
        user_id: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> TransportResult<()> {
        let body = json!({
            "channel": channel_id,
            "user": user_id,
            "blocks": blocks,
            "text": fallback_text,
        });
        self.post(bot_token, "chat.postEphemeral", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{is_retryable, Classify, FailureClass};

    #[test]
    fn config_defaults() {
        let config = SlackConfig::default();
        assert_eq!(config.api_base_url, "https://slack.com/api");
        assert_eq!(config.timeout, Duration::from_secs(15));
    }

    #[test]
    fn envelope_ok_is_success() {
        assert!(envelope_result(ApiEnvelope {
            ok: true,
            error: None
        })
        .is_ok());
    }

    #[test]
    fn envelope_ratelimited_is_retryable() {
        let err = envelope_result(ApiEnvelope {
            ok: false,
            error: Some("ratelimited".to_string()),
        })
        .unwrap_err();
        assert_eq!(err.failure_class(), FailureClass::RateLimited);
        assert!(is_retryable(err.failure_class()));
    }

    #[test]
    fn envelope_api_error_is_permanent() {
        let err = envelope_result(ApiEnvelope {
            ok: false,
            error: Some("channel_not_found".to_string()),
        })
        .unwrap_err();
        assert_eq!(err.failure_class(), FailureClass::Invariant);
        assert!(!is_retryable(err.failure_class()));
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn connection_refused_maps_to_network() {
        // Nothing listens on this port.
        let client = SlackClient::new(SlackConfig {
            api_base_url: "http://127.0.0.1:1/api".to_string(),
            timeout: Duration::from_secs(1),
        });

        let err = client
            .send_channel_text("xoxb-test", "C123", "hello")
            .await
            .unwrap_err();
        assert!(is_retryable(err.failure_class()), "got {err:?}");
    }
}
