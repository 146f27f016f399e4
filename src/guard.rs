//! Pattern-based pre-screening of requests
//!
//! The guard is the cheap, deterministic first line: each [`GuardRule`]
//! pattern is compiled once, and a request matching any of them is refused
//! before an evaluator ever sees it. Identities in a rule's exempt groups may
//! pass that rule.

use crate::model::{GuardRule, Identity};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use thiserror::Error;

/// A request matched a guard rule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Security Protocol Violation: {rule_id} - {description}")]
pub struct GuardViolation {
    pub rule_id: String,
    pub description: String,
}

/// Compile a guard pattern: case-insensitive, `^`/`$` match at line boundaries
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    description: String,
    exempt_groups: BTreeSet<String>,
    regex: Regex,
}

/// Compiled guard rules, checked in load order
#[derive(Debug, Clone, Default)]
pub struct Guard {
    rules: Vec<CompiledRule>,
}

impl Guard {
    /// Compile `rules`; a rule whose pattern does not compile is logged and skipped
    pub fn new(rules: &[GuardRule]) -> Self {
        let compiled = rules
            .iter()
            .filter(|rule| match rule.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, error = %e, "Skipping invalid guard rule");
                    false
                }
            })
            .filter_map(|rule| match compile_pattern(&rule.pattern) {
                Ok(regex) => Some(CompiledRule {
                    id: rule.id.clone(),
                    description: rule.description.clone(),
                    exempt_groups: rule.exempt_groups.clone(),
                    regex,
                }),
                Err(e) => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        error = %e,
                        "Skipping guard rule with invalid pattern"
                    );
                    None
                }
            })
            .collect();

        Self { rules: compiled }
    }

    pub fn active_rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Check `content` against every rule; the first non-exempt match wins
    pub fn check(&self, content: &str, actor: Option<&Identity>) -> Result<(), GuardViolation> {
        for rule in &self.rules {
            if !rule.regex.is_match(content) {
                continue;
            }

            if let Some(identity) = actor {
                if identity.is_member_of_any(&rule.exempt_groups) {
                    tracing::info!(
                        user_id = %identity.user_id,
                        rule_id = %rule.id,
                        "Guard match bypassed by group exemption"
                    );
                    continue;
                }
            }

            tracing::warn!(rule_id = %rule.id, "Guard blocked request");
            crate::metrics::record_guard_block(&rule.id);
            return Err(GuardViolation {
                rule_id: rule.id.clone(),
                description: rule.description.clone(),
            });
        }

        Ok(())
    }
}
