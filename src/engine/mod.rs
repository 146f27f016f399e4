//! Compliance engine
//!
//! Drives one request through the guard, the rule archive and the
//! evaluate→revise loop, and returns the audit trace. The evaluator and the
//! reviser are external collaborators behind the [`Evaluator`] and
//! [`Reviser`] traits.

mod cycle;

pub use cycle::{ComplianceEngine, GUARD_BLOCK_ID, RETRIES_EXHAUSTED_MESSAGE};

use crate::model::{Critique, Identity, Reference, Rule};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Judges a draft against the active rules
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Always produces a critique; failures are reported as violations
    async fn evaluate(
        &self,
        draft: &str,
        rules: &[Rule],
        references: &[Reference],
        actor: Option<&Identity>,
    ) -> Critique;
}

/// Rewrites a draft to address a critique
#[async_trait]
pub trait Reviser: Send + Sync {
    async fn revise(&self, draft: &str, critique: &Critique, rules: &[Rule]) -> Result<String>;
}

/// Default revision attempts per cycle
pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Input of one compliance cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRequest {
    /// The original user request, screened by the guard
    pub input_prompt: String,
    /// The generator's candidate response
    pub draft: String,
    /// `None` applies every rule; see [`ContextFilter`](crate::archive::ContextFilter)
    #[serde(default)]
    pub context_tags: Option<Vec<String>>,
    #[serde(default)]
    pub actor: Option<Identity>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ComplianceRequest {
    pub fn new(input_prompt: impl Into<String>, draft: impl Into<String>) -> Self {
        Self {
            input_prompt: input_prompt.into(),
            draft: draft.into(),
            context_tags: None,
            actor: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_context_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_actor(mut self, actor: Identity) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
