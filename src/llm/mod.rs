//! Text-generation adapters
//!
//! The compliance engine only knows the [`Evaluator`](crate::engine::Evaluator)
//! and [`Reviser`](crate::engine::Reviser) seams. This module provides the
//! implementations that drive a chat-completion service:
//!
//! - [`ConstitutionalJudge`]: builds the evaluation prompt and decodes a `Critique`
//! - [`RevisionEngine`]: builds the rewrite prompt for a violated rule
//! - [`SimulatedLlmClient`]: deterministic offline client
//! - [`HttpLlmClient`]: OpenAI-compatible `/chat/completions` client

mod http;
mod judge;
mod revision;
pub mod retry;
mod simulated;

pub use http::HttpLlmClient;
pub use judge::ConstitutionalJudge;
pub use revision::RevisionEngine;
pub use simulated::SimulatedLlmClient;

use crate::config::{LlmConfig, LlmProvider};
use crate::{ConstitutionError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Content of the first user message, or "" when there is none
pub(crate) fn user_content(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// A chat-completion service
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-form completion
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<String>;

    /// Completion decoded as a JSON object
    ///
    /// The default asks for a plain completion and extracts the first JSON
    /// object from it, tolerating Markdown code fences.
    async fn structured_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<serde_json::Value> {
        let text = self.chat_completion(messages, model, temperature).await?;
        extract_json(&text)
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<String> {
        (**self).chat_completion(messages, model, temperature).await
    }

    async fn structured_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<serde_json::Value> {
        (**self)
            .structured_completion(messages, model, temperature)
            .await
    }
}

/// Parse the outermost `{...}` in `text` as JSON
pub(crate) fn extract_json(text: &str) -> Result<serde_json::Value> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(serde_json::from_str(&text[start..=end])?),
        _ => Err(ConstitutionError::Llm(format!(
            "expected a JSON object in completion, got: {}",
            truncate(text, 200)
        ))),
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Build the client selected by configuration
pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider {
        LlmProvider::Simulated => Ok(Arc::new(SimulatedLlmClient::new())),
        LlmProvider::Http => Ok(Arc::new(HttpLlmClient::from_config(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_block() {
        let value = extract_json("```json\n{\"violation\": false, \"reasoning\": \"ok\"}\n```").unwrap();
        assert_eq!(value["violation"], serde_json::json!(false));
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        let err = extract_json("I think it is fine.").unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn test_user_content_picks_first_user_message() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("draft"),
            ChatMessage::user("later"),
        ];
        assert_eq!(user_content(&messages), "draft");
        assert_eq!(user_content(&messages[..1]), "");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::system("x")).unwrap();
        assert_eq!(json["role"], "system");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
