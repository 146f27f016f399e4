//! LLM-backed reviser

use super::{ChatMessage, LlmClient};
use crate::engine::Reviser;
use crate::model::{Critique, Rule};
use crate::Result;
use async_trait::async_trait;

const SYSTEM_PROMPT: &str = "You are a Revision Engine. Rewrite the Original Draft so that it no \
longer violates the Violated Law described in the Critique. Preserve the intent and every \
compliant part of the draft. Do not invent facts or citations. Respond with the revised text \
only, without commentary.";

const REVISION_TEMPERATURE: f32 = 0.2;

/// Rewrites drafts to address a critique
#[derive(Debug, Clone)]
pub struct RevisionEngine<C> {
    client: C,
    model: String,
}

impl<C: LlmClient> RevisionEngine<C> {
    pub fn new(client: C, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn build_messages(&self, draft: &str, critique: &Critique, rules: &[Rule]) -> Vec<ChatMessage> {
        let article_id = critique.article_id.as_deref().unwrap_or("UNKNOWN");
        let law = match rules.iter().find(|rule| rule.id == article_id) {
            Some(rule) => format!("{}: {}", rule.id, rule.text),
            None => format!("Law ID {} (Text not found in provided context)", article_id),
        };

        let user = format!(
            "--- ORIGINAL DRAFT ---\n{}\n\n--- CRITIQUE ---\n{}\n\n--- VIOLATED LAW ---\n{}",
            draft, critique.reasoning, law
        );
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
    }
}

#[async_trait]
impl<C: LlmClient> Reviser for RevisionEngine<C> {
    async fn revise(&self, draft: &str, critique: &Critique, rules: &[Rule]) -> Result<String> {
        if !critique.violation || draft.trim().is_empty() {
            return Ok(draft.to_string());
        }

        tracing::info!(
            article_id = critique.article_id.as_deref().unwrap_or("UNKNOWN"),
            draft_len = draft.len(),
            "Revising draft"
        );

        let messages = self.build_messages(draft, critique, rules);
        let revised = self
            .client
            .chat_completion(&messages, &self.model, REVISION_TEMPERATURE)
            .await?;
        Ok(revised.trim().to_string())
    }
}
