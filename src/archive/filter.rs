//! Context-tag matching

use std::collections::{BTreeSet, HashSet};

/// Decides which tagged artifacts are active for a request context
///
/// - no context: everything is active
/// - empty context: only untagged artifacts are active
/// - otherwise: untagged artifacts, plus those sharing at least one tag
#[derive(Debug, Clone)]
pub struct ContextFilter<'a> {
    context: Option<HashSet<&'a str>>,
}

impl<'a> ContextFilter<'a> {
    pub fn new(context_tags: Option<&'a [String]>) -> Self {
        Self {
            context: context_tags.map(|tags| tags.iter().map(String::as_str).collect()),
        }
    }

    pub fn admits(&self, tags: &BTreeSet<String>) -> bool {
        match &self.context {
            None => true,
            Some(_) if tags.is_empty() => true,
            Some(context) => tags.iter().any(|tag| context.contains(tag.as_str())),
        }
    }
}
