use crate::config::CompletionConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

pub const COMPLETION_MODEL: &str = "deepseek-chat";
pub const COMPLETION_TEMPERATURE: f32 = 0.5;
pub const COMPLETION_MAX_TOKENS: u32 = 500;

/// Sent instead of a completion whenever the API call fails.
pub const FALLBACK_REPLY: &str = "抱歉，目前無法處理您的請求。";

#[derive(thiserror::Error, Debug)]
pub enum CompletionError {
    #[error("Completion request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Completion API error: {status} - {body}")]
    Status { status: StatusCode, body: String },
    #[error("Malformed completion response: {0}")]
    Malformed(#[source] reqwest::Error),
    #[error("Completion response had no message content")]
    EmptyResponse,
}
impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout
        } else if e.is_decode() {
            CompletionError::Malformed(e)
        } else {
            CompletionError::Network(e)
        }
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    /// A single attempt at generating a reply for the prompt.
    async fn try_complete(&self, text: &str) -> Result<String, CompletionError>;

    /// Never fails: any error is logged and replaced with [`FALLBACK_REPLY`].
    async fn complete(&self, text: &str) -> String {
        match self.try_complete(text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Failed to get completion reply: {e}");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,

    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: &'static str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}
impl ChatCompletionRequest {
    /// A single user message, no system prompt or history.
    pub fn for_prompt(text: &str) -> Self {
        Self {
            model: COMPLETION_MODEL,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(text.to_string()),
            }],
            temperature: COMPLETION_TEMPERATURE,
            max_tokens: COMPLETION_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatMessage,
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
}
impl CompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .with_context(|| "Failed to build completion Reqwest client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.api_base.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Completer for CompletionClient {
    #[instrument(skip(self, text), fields(prompt_length = text.len()))]
    async fn try_complete(&self, text: &str) -> Result<String, CompletionError> {
        debug!("Sending request to completion API");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ChatCompletionRequest::for_prompt(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Status { status, body });
        }

        let completion = response.json::<ChatCompletionResponse>().await?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or(CompletionError::EmptyResponse)?;

        debug!("Successfully received completion reply");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_upstream;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn client_for(api_base: String, timeout_secs: u64) -> CompletionClient {
        CompletionClient::new(&CompletionConfig {
            api_key: "sk-test".to_string(),
            api_base,
            timeout_secs,
        })
        .unwrap()
    }

    async fn upstream_replying(status: u16, body: &'static str) -> String {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move || async move {
                (
                    axum::http::StatusCode::from_u16(status).unwrap(),
                    [("content-type", "application/json")],
                    body,
                )
            }),
        );
        format!("{}/v1", spawn_upstream(router).await)
    }

    #[test]
    fn test_request_body() {
        let value = serde_json::to_value(ChatCompletionRequest::for_prompt("hello")).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "deepseek-chat",
                "messages": [{"role": "user", "content": "hello"}],
                "temperature": 0.5,
                "max_tokens": 500
            })
        );

        // Whitespace prompts go through untouched.
        let value = serde_json::to_value(ChatCompletionRequest::for_prompt("  ")).unwrap();
        assert_eq!(value["messages"][0]["content"], "  ");
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let received: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::default();
        let recorder = Arc::clone(&received);
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    recorder.lock().unwrap().push((auth, body));
                    Json(json!({
                        "id": "chatcmpl-1",
                        "object": "chat.completion",
                        "choices": [
                            {"index": 0, "message": {"role": "assistant", "content": "\n  Hi! How can I help?  \n"}, "finish_reason": "stop"},
                            {"index": 1, "message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
                        ]
                    }))
                }
            }),
        );
        let client = client_for(format!("{}/v1/", spawn_upstream(router).await), 5);

        assert_eq!(client.try_complete("hello").await.unwrap(), "Hi! How can I help?");
        assert_eq!(client.complete("hello").await, "Hi! How can I help?");

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].0.as_deref(), Some("Bearer sk-test"));
        assert_eq!(received[0].1["model"], "deepseek-chat");
        assert_eq!(received[0].1["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn test_error_status() {
        let base = upstream_replying(401, r#"{"error":{"message":"Authentication Fails"}}"#).await;
        let client = client_for(base, 5);

        match client.try_complete("hello").await {
            Err(CompletionError::Status { status, body }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(body.contains("Authentication Fails"));
            }
            other => panic!("Expected status error, got {other:?}"),
        }
        assert_eq!(client.complete("hello").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_malformed_and_empty_responses() {
        let client = client_for(upstream_replying(200, "this is not json").await, 5);
        assert!(matches!(
            client.try_complete("hello").await,
            Err(CompletionError::Malformed(_))
        ));
        assert_eq!(client.complete("hello").await, FALLBACK_REPLY);

        let client = client_for(upstream_replying(200, r#"{"choices":[]}"#).await, 5);
        assert!(matches!(
            client.try_complete("hello").await,
            Err(CompletionError::EmptyResponse)
        ));

        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let client = client_for(upstream_replying(200, body).await, 5);
        assert!(matches!(
            client.try_complete("hello").await,
            Err(CompletionError::EmptyResponse)
        ));
        assert_eq!(client.complete("hello").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_timeout() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"choices": [{"message": {"role": "assistant", "content": "late"}}]}))
            }),
        );
        let client = client_for(format!("{}/v1", spawn_upstream(router).await), 1);

        assert!(matches!(
            client.try_complete("hello").await,
            Err(CompletionError::Timeout)
        ));
        assert_eq!(client.complete("hello").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let client = client_for("http://127.0.0.1:1/v1".to_string(), 5);
        assert!(matches!(
            client.try_complete("hello").await,
            Err(CompletionError::Network(_))
        ));
        assert_eq!(client.complete("hello").await, FALLBACK_REPLY);
    }
}
