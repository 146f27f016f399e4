//! Governance artifacts: rules, guard rules and citation references

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Scope a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleCategory {
    Universal,
    Domain,
    Tenant,
}

impl RuleCategory {
    /// All categories, in declaration order
    pub const ALL: [RuleCategory; 3] = [
        RuleCategory::Universal,
        RuleCategory::Domain,
        RuleCategory::Tenant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Universal => "Universal",
            RuleCategory::Domain => "Domain",
            RuleCategory::Tenant => "Tenant",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "universal" => Ok(RuleCategory::Universal),
            "domain" => Ok(RuleCategory::Domain),
            "tenant" => Ok(RuleCategory::Tenant),
            other => Err(format!(
                "unknown category '{}', expected Universal, Domain or Tenant",
                other
            )),
        }
    }
}

/// Severity of a violation, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        f.write_str(name)
    }
}

/// A governance statement content must not violate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier (e.g. "GCP.4")
    pub id: String,
    pub category: RuleCategory,
    /// The text of the rule as shown to the evaluator
    pub text: String,
    #[serde(default)]
    pub severity: Severity,
    /// Context tags; empty means the rule applies in every context
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Source reference (e.g. "FDA 21 CFR Part 11")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Rule {
    /// Create a new untagged rule with default severity
    pub fn new(id: impl Into<String>, category: RuleCategory, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            text: text.into(),
            severity: Severity::default(),
            tags: BTreeSet::new(),
            source: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Check field-level invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        if self.text.trim().is_empty() {
            return Err(format!("rule {} has empty text", self.id));
        }
        Ok(())
    }
}

/// A pre-generation, pattern-based hard block on the request itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRule {
    pub id: String,
    /// Regular expression, matched case-insensitively in multi-line mode
    pub pattern: String,
    pub description: String,
    /// Identity groups allowed to bypass this rule
    #[serde(default)]
    pub exempt_groups: BTreeSet<String>,
}

impl GuardRule {
    pub fn new(
        id: impl Into<String>,
        pattern: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            description: description.into(),
            exempt_groups: BTreeSet::new(),
        }
    }

    pub fn with_exempt_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("guard rule id must not be empty".to_string());
        }
        // An empty regex matches every prompt
        if self.pattern.trim().is_empty() {
            return Err(format!("guard rule {} has an empty pattern", self.id));
        }
        Ok(())
    }
}

/// A citation source the evaluator may treat as valid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Reference {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            tags: BTreeSet::new(),
            url: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("reference id must not be empty".to_string());
        }
        if self.text.trim().is_empty() {
            return Err(format!("reference {} has empty text", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_defaults_from_json() {
        let rule: Rule = serde_json::from_str(
            r#"{"id": "U1", "category": "Universal", "text": "Do no harm."}"#,
        )
        .unwrap();
        assert_eq!(rule.severity, Severity::Medium);
        assert!(rule.tags.is_empty());
        assert!(rule.source.is_none());
    }

    #[test]
    fn test_rule_tags_are_a_set() {
        let rule: Rule = serde_json::from_str(
            r#"{"id": "T1", "category": "Tenant", "text": "x", "tags": ["b", "a", "b"]}"#,
        )
        .unwrap();
        assert_eq!(rule.tags.len(), 2);
    }

    #[test]
    fn test_rule_unknown_fields_ignored() {
        let rule: Rule = serde_json::from_str(
            r#"{"id": "E1", "category": "Universal", "text": "x", "metadata": {"author": "a"}}"#,
        )
        .unwrap();
        assert_eq!(rule.id, "E1");
    }

    #[test]
    fn test_rule_invalid_category_rejected() {
        let result: Result<Rule, _> =
            serde_json::from_str(r#"{"id": "X", "category": "Galactic", "text": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rule_validation() {
        assert!(Rule::new("", RuleCategory::Universal, "x").validate().is_err());
        assert!(Rule::new("R", RuleCategory::Universal, "  ").validate().is_err());
        assert!(Rule::new("R", RuleCategory::Universal, "ok").validate().is_ok());
    }

    #[test]
    fn test_guard_rule_validation() {
        assert!(GuardRule::new("", "rm", "x").validate().is_err());
        assert!(GuardRule::new("G", "", "x").validate().is_err());
        assert!(GuardRule::new("G", "  \t", "x").validate().is_err());
        assert!(GuardRule::new("G", "rm -rf", "x").validate().is_ok());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("tenant".parse::<RuleCategory>(), Ok(RuleCategory::Tenant));
        assert!("nope".parse::<RuleCategory>().is_err());
    }

    #[test]
    fn test_reference_metadata_roundtrips_open_values() {
        let reference: Reference = serde_json::from_str(
            r#"{"id": "R1", "text": "Trial", "metadata": {"phase": 3, "blinded": true}}"#,
        )
        .unwrap();
        assert_eq!(reference.metadata["phase"], serde_json::json!(3));
        assert!(reference.validate().is_ok());
    }
}
