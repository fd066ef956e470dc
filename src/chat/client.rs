//! OpenAI-compatible `/chat/completions` client with bounded retries.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::core::config::LlmConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("LLM request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("LLM returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("LLM response had no message content")]
    EmptyResponse,
}

impl ChatError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::EmptyResponse => false,
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;
}

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    backoff_base: Duration,
}

impl OpenAiClient {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(500),
        })
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn attempt(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": messages,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        let body: Value = response.json().await?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ChatError::EmptyResponse)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let mut attempt = 0;
        loop {
            match self.attempt(messages).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "LLM attempt {} failed ({e}), retrying in {}ms",
                        attempt + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("LLM call gave up after {} attempts", attempt + 1);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str, max_retries: u32) -> OpenAiClient {
        let config = LlmConfig {
            api_key: Some("test-key".into()),
            base_url: base_url.to_string(),
            model: "test-model".into(),
            max_retries,
            timeout_secs: 5,
        };
        OpenAiClient::new("test-key".into(), &config)
            .unwrap()
            .with_backoff_base(Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles() {
        let client = client("http://localhost", 3).with_backoff_base(Duration::from_millis(500));
        assert_eq!(client.backoff(0), Duration::from_millis(500));
        assert_eq!(client.backoff(1), Duration::from_millis(1000));
        assert_eq!(client.backoff(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_returns_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":" Try restarting. "}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let reply = client(&server.url(), 2)
            .complete(&[ChatMessage::user("printer is down")])
            .await
            .unwrap();
        assert_eq!(reply, "Try restarting.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .expect(4)
            .create_async()
            .await;

        let err = client(&server.url(), 3)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body(r#"{"error":"bad model"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server.url(), 3)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Status { status, .. } if status == StatusCode::BAD_REQUEST));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let err = client(&server.url(), 1)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        limited.assert_async().await;
    }
}
