//! Deterministic offline client for demos and tests
//!
//! Recognises two canned stories. A draft acting on a "hunch" violates the
//! evidence rule (GCP.4) and is rewritten into an evidence-based statement. A
//! draft citing the unlisted study NCT99999 violates the citation rule (REF.1)
//! and is rewritten with a "citation needed" marker. Each story only fires
//! when its rule id is part of the prompt, so context filtering carries
//! through. Everything else is judged compliant and echoed back on revision.

use super::{user_content, ChatMessage, LlmClient};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;

const HUNCH_TRIGGER: &str = "hunch";
const HUNCH_RULE: &str = "GCP.4";
const HUNCH_REWRITE: &str =
    "Based on current data, a dosage change is not supported without further trial evidence.";

const CITATION_TRIGGER: &str = "NCT99999";
const CITATION_RULE: &str = "REF.1";
const CITATION_REWRITE: &str = "The summary cites a relevant study (citation needed).";

const DRAFT_HEADER: &str = "--- ORIGINAL DRAFT ---";
const CRITIQUE_HEADER: &str = "--- CRITIQUE ---";
const LAW_HEADER: &str = "--- VIOLATED LAW ---";
const EVAL_DRAFT_HEADER: &str = "--- DRAFT CONTENT ---";

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedLlmClient;

impl SimulatedLlmClient {
    pub fn new() -> Self {
        Self
    }
}

/// Text following `header` up to the next `---` section, trimmed
fn section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)? + header.len();
    let rest = &content[start..];
    let end = rest.find("\n--- ").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

#[async_trait]
impl LlmClient for SimulatedLlmClient {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        _temperature: f32,
    ) -> Result<String> {
        let content = user_content(messages);
        let draft = section(content, DRAFT_HEADER).unwrap_or("");
        let law = section(content, LAW_HEADER).unwrap_or("");

        if law.starts_with(HUNCH_RULE) && draft.to_lowercase().contains(HUNCH_TRIGGER) {
            return Ok(HUNCH_REWRITE.to_string());
        }
        if law.starts_with(CITATION_RULE) && draft.contains(CITATION_TRIGGER) {
            return Ok(CITATION_REWRITE.to_string());
        }

        if content.contains(DRAFT_HEADER) && content.contains(CRITIQUE_HEADER) {
            return Ok(draft.to_string());
        }
        Ok("Simulated Revision: Content revised for compliance.".to_string())
    }

    async fn structured_completion(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        _temperature: f32,
    ) -> Result<serde_json::Value> {
        let content = user_content(messages);
        let draft = section(content, EVAL_DRAFT_HEADER).unwrap_or("");
        let offers = |rule_id: &str| content.contains(&format!("Law ID: {}\n", rule_id));

        if offers(HUNCH_RULE) && draft.to_lowercase().contains(HUNCH_TRIGGER) {
            return Ok(json!({
                "violation": true,
                "article_id": HUNCH_RULE,
                "severity": "High",
                "reasoning": "The draft recommends a dosage change based on a 'hunch', which violates the requirement for evidence-based claims."
            }));
        }
        if offers(CITATION_RULE) && draft.contains(CITATION_TRIGGER) {
            return Ok(json!({
                "violation": true,
                "article_id": CITATION_RULE,
                "severity": "Medium",
                "reasoning": "The draft cites 'Study NCT99999' which is not found in the valid references list."
            }));
        }

        Ok(json!({
            "violation": false,
            "article_id": null,
            "reasoning": "The content appears compliant with the provided laws."
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Evaluator, Reviser};
    use crate::llm::{ConstitutionalJudge, RevisionEngine};
    use crate::model::{Critique, Rule, RuleCategory, Severity};

    fn laws() -> Vec<Rule> {
        vec![
            Rule::new("GCP.4", RuleCategory::Domain, "No speculation."),
            Rule::new("REF.1", RuleCategory::Domain, "Valid citations only."),
        ]
    }

    #[tokio::test]
    async fn test_hunch_story() {
        let judge = ConstitutionalJudge::new(SimulatedLlmClient::new(), "sim");
        let critique = judge
            .evaluate("I have a Hunch we should double the dose.", &laws(), &[], None)
            .await;
        assert!(critique.violation);
        assert_eq!(critique.article_id.as_deref(), Some("GCP.4"));
        assert_eq!(critique.severity, Severity::High);

        let reviser = RevisionEngine::new(SimulatedLlmClient::new(), "sim");
        let revised = reviser
            .revise("I have a Hunch we should double the dose.", &critique, &laws())
            .await
            .unwrap();
        assert_eq!(revised, HUNCH_REWRITE);
        assert!(!judge.evaluate(&revised, &laws(), &[], None).await.violation);
    }

    #[tokio::test]
    async fn test_citation_story() {
        let judge = ConstitutionalJudge::new(SimulatedLlmClient::new(), "sim");
        let critique = judge
            .evaluate("See Study NCT99999 for details.", &laws(), &[], None)
            .await;
        assert_eq!(critique.article_id.as_deref(), Some("REF.1"));
        assert_eq!(critique.severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_story_needs_its_rule_in_context() {
        let judge = ConstitutionalJudge::new(SimulatedLlmClient::new(), "sim");
        let only_citation = vec![Rule::new("REF.1", RuleCategory::Domain, "Valid citations only.")];
        let critique = judge
            .evaluate("I have a hunch about NCT99999.", &only_citation, &[], None)
            .await;
        assert_eq!(critique.article_id.as_deref(), Some("REF.1"));

        let reviser = RevisionEngine::new(SimulatedLlmClient::new(), "sim");
        let revised = reviser
            .revise("I have a hunch about NCT99999.", &critique, &only_citation)
            .await
            .unwrap();
        assert!(revised.contains("citation needed"));
    }

    #[tokio::test]
    async fn test_fallbacks() {
        let judge = ConstitutionalJudge::new(SimulatedLlmClient::new(), "sim");
        assert!(!judge.evaluate("All good.", &laws(), &[], None).await.violation);

        let reviser = RevisionEngine::new(SimulatedLlmClient::new(), "sim");
        let critique = Critique::violation("OTHER.1", Severity::Low, "meh");
        assert_eq!(
            reviser.revise("Keep me", &critique, &laws()).await.unwrap(),
            "Keep me"
        );

        let bare = SimulatedLlmClient::new()
            .chat_completion(&[ChatMessage::user("hello")], "sim", 0.0)
            .await
            .unwrap();
        assert_eq!(bare, "Simulated Revision: Content revised for compliance.");
    }
}
