//! OpenAI-compatible chat-completion client

use super::retry::{with_retry, RetryConfig};
use super::{extract_json, truncate, ChatMessage, LlmClient};
use crate::config::LlmConfig;
use crate::{ConstitutionError, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

/// Client for any service exposing `POST {base_url}/chat/completions`
#[derive(Debug, Clone)]
pub struct HttpLlmClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpLlmClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static(concat!(
                        "charterguard/",
                        env!("CARGO_PKG_VERSION")
                    )),
                );
                headers
            })
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: None,
            retry: RetryConfig::default(),
        })
    }

    /// Build from configuration, reading the API key from `api_key_env`
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut client = Self::new(base_url, Duration::from_secs(config.timeout_secs))?;
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => client.api_key = Some(key),
            _ => tracing::warn!(
                env = %config.api_key_env,
                "No API key found; requests will be sent unauthenticated"
            ),
        }
        Ok(client)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete_once(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
        json_mode: bool,
    ) -> Result<String> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {
                let completion: CompletionResponse = response.json().await?;
                completion
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| {
                        ConstitutionError::Llm("completion response had no content".to_string())
                    })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let wait = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                Err(ConstitutionError::RateLimited(wait))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ConstitutionError::Llm(
                "provider rejected the API key".to_string(),
            )),
            status if status.is_server_error() => match response.error_for_status() {
                Err(e) => Err(e.into()),
                Ok(_) => Err(ConstitutionError::Llm(format!("provider error: HTTP {}", status))),
            },
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(ConstitutionError::Llm(format!(
                    "provider error: HTTP {}: {}",
                    status,
                    truncate(&text, 320)
                )))
            }
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
        json_mode: bool,
    ) -> Result<String> {
        with_retry(&self.retry, "chat_completion", || {
            self.complete_once(messages, model, temperature, json_mode)
        })
        .await
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<String> {
        self.complete(messages, model, temperature, false).await
    }

    async fn structured_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<serde_json::Value> {
        let text = self.complete(messages, model, temperature, true).await?;
        extract_json(&text)
    }
}
