//! LLM-backed evaluator

use super::{ChatMessage, LlmClient};
use crate::engine::Evaluator;
use crate::model::{Critique, Identity, Reference, Rule, Severity};
use crate::ConstitutionError;
use async_trait::async_trait;

/// Article id used when the evaluator itself failed
pub const SYSTEM_ERROR_ID: &str = "SYSTEM_ERROR";
/// Article id used when the model flagged a violation without naming a rule
pub const UNKNOWN_ID: &str = "UNKNOWN";

const SYSTEM_PROMPT: &str = "You are a Constitutional Judge. Evaluate the Draft Content strictly \
against the Constitution Laws below. If the content violates ANY law, set violation=true, put the \
'id' of the violated law in 'article_id', give its severity (Low, Medium, High or Critical) and \
explain the violation in 'reasoning'. If several laws are violated, cite the most severe one. If \
the content is compliant, set violation=false. Respond with a single JSON object with the keys \
violation, article_id, severity and reasoning.";

const REFERENCES_PROMPT: &str = " Any study, trial or document cited by the draft must appear in \
the VALID REFERENCES list; a citation that is not listed there is a violation of the citation law.";

/// Evaluates drafts by asking a chat model for a structured critique
#[derive(Debug, Clone)]
pub struct ConstitutionalJudge<C> {
    client: C,
    model: String,
}

impl<C: LlmClient> ConstitutionalJudge<C> {
    pub fn new(client: C, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// System and user messages for one evaluation
    pub fn build_messages(
        &self,
        draft: &str,
        rules: &[Rule],
        references: &[Reference],
    ) -> Vec<ChatMessage> {
        let mut system = SYSTEM_PROMPT.to_string();
        if !references.is_empty() {
            system.push_str(REFERENCES_PROMPT);
        }

        let laws = rules
            .iter()
            .map(|rule| {
                format!(
                    "Law ID: {}\nCategory: {}\nText: {}",
                    rule.id, rule.category, rule.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut user = format!("--- CONSTITUTION LAWS ---\n{}\n\n", laws);
        if !references.is_empty() {
            let refs = references
                .iter()
                .map(|reference| match &reference.url {
                    Some(url) => format!(
                        "ID: {} | Text: {} | URL: {}",
                        reference.id, reference.text, url
                    ),
                    None => format!("ID: {} | Text: {}", reference.id, reference.text),
                })
                .collect::<Vec<_>>()
                .join("\n");
            user.push_str(&format!("--- VALID REFERENCES ---\n{}\n\n", refs));
        }
        // Draft goes last so nothing from the archive can follow it
        user.push_str(&format!("--- DRAFT CONTENT ---\n{}", draft));

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    async fn request_critique(
        &self,
        messages: &[ChatMessage],
    ) -> crate::Result<Critique> {
        let value = self
            .client
            .structured_completion(messages, &self.model, 0.0)
            .await?;
        let mut critique: Critique = serde_json::from_value(value)?;
        critique.validate().map_err(ConstitutionError::Llm)?;

        if critique.violation && critique.article_id.as_deref().map_or(true, str::is_empty) {
            tracing::warn!("Judge reported a violation without an article id");
            critique.article_id = Some(UNKNOWN_ID.to_string());
        }
        Ok(critique)
    }
}

#[async_trait]
impl<C: LlmClient> Evaluator for ConstitutionalJudge<C> {
    async fn evaluate(
        &self,
        draft: &str,
        rules: &[Rule],
        references: &[Reference],
        actor: Option<&Identity>,
    ) -> Critique {
        if draft.trim().is_empty() {
            tracing::warn!("Judge received an empty draft");
            return Critique::compliant("Draft is empty; no content to evaluate.");
        }
        if rules.is_empty() {
            tracing::warn!("Judge received no laws to check against");
            return Critique::compliant("No laws provided for evaluation.");
        }

        tracing::info!(
            draft_len = draft.len(),
            laws = rules.len(),
            references = references.len(),
            user_id = actor.map(|a| a.user_id.as_str()),
            "Judge evaluating draft"
        );

        let messages = self.build_messages(draft, rules, references);
        match self.request_critique(&messages).await {
            Ok(critique) => critique,
            Err(e) => {
                tracing::error!(error = %e, "Judge failed to evaluate draft");
                Critique {
                    violation: true,
                    article_id: Some(SYSTEM_ERROR_ID.to_string()),
                    severity: Severity::Critical,
                    reasoning: format!("System Error during evaluation: {}", e),
                }
            }
        }
    }
}
