//! Critiques and compliance traces

use super::rule::Severity;
use serde::{Deserialize, Serialize};

/// A structured judgment of whether content violates a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub violation: bool,
    /// Id of the violated rule, or a synthetic id such as `GUARD_BLOCK`
    #[serde(default)]
    pub article_id: Option<String>,
    #[serde(default = "default_critique_severity")]
    pub severity: Severity,
    pub reasoning: String,
}

fn default_critique_severity() -> Severity {
    Severity::Low
}

impl Critique {
    /// A critique reporting no violation
    pub fn compliant(reasoning: impl Into<String>) -> Self {
        Self {
            violation: false,
            article_id: None,
            severity: Severity::Low,
            reasoning: reasoning.into(),
        }
    }

    /// A critique reporting a violation of `article_id`
    pub fn violation(
        article_id: impl Into<String>,
        severity: Severity,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            violation: true,
            article_id: Some(article_id.into()),
            severity,
            reasoning: reasoning.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.reasoning.trim().is_empty() {
            return Err("critique reasoning must not be empty".to_string());
        }
        Ok(())
    }
}

/// Final disposition of a compliance cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStatus {
    /// The draft passed unchanged
    Approved,
    /// The draft was revised into compliance
    Revised,
    /// No compliant output could be released
    Blocked,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Approved => "APPROVED",
            TraceStatus::Revised => "REVISED",
            TraceStatus::Blocked => "BLOCKED",
        }
    }
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluate→revise round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceIteration {
    pub input_draft: String,
    pub critique: Critique,
    pub revised_output: String,
}

/// The complete audit record of a compliance cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceTrace {
    pub status: TraceStatus,
    pub input_draft: String,
    /// The critique that triggered the cycle, or the compliant one if none did
    pub critique: Critique,
    pub revised_output: String,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub history: Vec<TraceIteration>,
}

impl ComplianceTrace {
    pub fn approved(draft: impl Into<String>, critique: Critique) -> Self {
        let draft = draft.into();
        Self {
            status: TraceStatus::Approved,
            input_draft: draft.clone(),
            critique,
            revised_output: draft,
            delta: None,
            history: Vec::new(),
        }
    }

    pub fn blocked(
        draft: impl Into<String>,
        critique: Critique,
        message: impl Into<String>,
        history: Vec<TraceIteration>,
    ) -> Self {
        Self {
            status: TraceStatus::Blocked,
            input_draft: draft.into(),
            critique,
            revised_output: message.into(),
            delta: None,
            history,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == TraceStatus::Blocked
    }
}
