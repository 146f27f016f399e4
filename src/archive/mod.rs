//! Rule archive: the read-only store of rules, guard rules and references
//!
//! Loads governance artifacts from a directory of JSON/YAML files (and/or the
//! built-in defaults) into an immutable [`ArchiveSnapshot`]. A load builds the
//! complete snapshot first and only then publishes it, so a failed load leaves
//! the previous snapshot in place and readers never see a partial state.
//!
//! # Example
//!
//! ```no_run
//! use charterguard::archive::RuleArchive;
//! use std::path::Path;
//!
//! let archive = RuleArchive::new();
//! archive.load(Path::new("./rules"))?;
//!
//! let tags = vec!["tenant:acme".to_string()];
//! for rule in archive.get_rules(None, Some(&tags)) {
//!     println!("{}: {}", rule.id, rule.text);
//! }
//! # Ok::<(), charterguard::error::ArchiveError>(())
//! ```

mod artifact;
mod defaults;
mod filter;
mod loader;

pub use artifact::{Artifact, Bundle};
pub use defaults::DEFAULTS_LABEL;
pub use filter::ContextFilter;
pub use loader::{Format, SnapshotBuilder};

use crate::error::ArchiveError;
use crate::guard::Guard;
use crate::model::{GuardRule, Reference, Rule, RuleCategory};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Version reported when no loaded bundle declared one
pub const UNVERSIONED: &str = "0.0.0";

/// One fully loaded, immutable archive state
///
/// The guard is compiled from `guard_rules` when the snapshot is built, so a
/// reader holding the snapshot sees rules and guard of the same load.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSnapshot {
    pub rules: Vec<Rule>,
    pub guard_rules: Vec<GuardRule>,
    pub guard: Guard,
    pub references: Vec<Reference>,
    pub version: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl ArchiveSnapshot {
    /// Rules matching the category filter and the context
    ///
    /// `categories` of `None` or empty applies no category filter.
    /// See [`ContextFilter`] for the meaning of `context_tags`.
    pub fn rules_for(
        &self,
        categories: Option<&[RuleCategory]>,
        context_tags: Option<&[String]>,
    ) -> Vec<Rule> {
        let filter = ContextFilter::new(context_tags);
        let categories = categories.filter(|c| !c.is_empty());

        self.rules
            .iter()
            .filter(|rule| categories.map_or(true, |c| c.contains(&rule.category)))
            .filter(|rule| filter.admits(&rule.tags))
            .cloned()
            .collect()
    }

    /// References active for the context
    pub fn references_for(&self, context_tags: Option<&[String]>) -> Vec<Reference> {
        let filter = ContextFilter::new(context_tags);

        self.references
            .iter()
            .filter(|reference| filter.admits(&reference.tags))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> ArchiveStats {
        ArchiveStats {
            rules: self.rules.len(),
            guard_rules: self.guard_rules.len(),
            references: self.references.len(),
        }
    }
}

/// Artifact counts of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    pub rules: usize,
    pub guard_rules: usize,
    pub references: usize,
}

/// Read access the compliance engine needs from a rule store
///
/// One cycle reads guard, rules and references from the single snapshot
/// returned here. Errors are query-time failures of the backing store and
/// abort the cycle.
pub trait RuleSource: Send + Sync {
    fn current_snapshot(&self) -> crate::Result<Arc<ArchiveSnapshot>>;
}

/// Swappable holder of the current [`ArchiveSnapshot`]
pub struct RuleArchive {
    snapshot: ArcSwap<ArchiveSnapshot>,
}

impl Default for RuleArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleArchive")
            .field("stats", &self.stats())
            .field("version", &self.version())
            .finish()
    }
}

impl RuleArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ArchiveSnapshot::default()),
        }
    }

    /// Replace the archive contents with the artifacts found under `root`
    pub fn load(&self, root: &Path) -> Result<ArchiveStats, ArchiveError> {
        let mut builder = SnapshotBuilder::new();
        builder.add_dir(root)?;
        Ok(self.publish(builder, &root.display().to_string()))
    }

    /// Replace the archive contents with the built-in rule set
    pub fn load_defaults(&self) -> Result<ArchiveStats, ArchiveError> {
        let mut builder = SnapshotBuilder::new();
        defaults::add_defaults(&mut builder)?;
        Ok(self.publish(builder, DEFAULTS_LABEL))
    }

    /// Replace the archive contents with the built-in rule set plus `root`
    ///
    /// An id defined both in the defaults and under `root` is a duplicate.
    pub fn load_with_defaults(&self, root: &Path) -> Result<ArchiveStats, ArchiveError> {
        let mut builder = SnapshotBuilder::new();
        defaults::add_defaults(&mut builder)?;
        builder.add_dir(root)?;
        Ok(self.publish(builder, &root.display().to_string()))
    }

    fn publish(&self, builder: SnapshotBuilder, source: &str) -> ArchiveStats {
        let files = builder.files();
        let snapshot = builder.build();
        let stats = snapshot.stats();

        tracing::info!(
            source = %source,
            files,
            rules = stats.rules,
            guard_rules = stats.guard_rules,
            references = stats.references,
            version = snapshot.version.as_deref().unwrap_or(UNVERSIONED),
            "Published rule archive snapshot"
        );

        crate::metrics::record_archive(&stats);
        self.snapshot.store(Arc::new(snapshot));
        stats
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<ArchiveSnapshot> {
        self.snapshot.load_full()
    }

    /// Rules matching the category filter and the context
    ///
    /// `categories` of `None` or empty applies no category filter.
    /// See [`ContextFilter`] for the meaning of `context_tags`.
    pub fn get_rules(
        &self,
        categories: Option<&[RuleCategory]>,
        context_tags: Option<&[String]>,
    ) -> Vec<Rule> {
        self.snapshot.load().rules_for(categories, context_tags)
    }

    /// All guard rules, in load order
    pub fn get_guard_rules(&self) -> Vec<GuardRule> {
        self.snapshot.load().guard_rules.clone()
    }

    /// References active for the context
    pub fn get_references(&self, context_tags: Option<&[String]>) -> Vec<Reference> {
        self.snapshot.load().references_for(context_tags)
    }

    pub fn version(&self) -> String {
        self.snapshot
            .load()
            .version
            .clone()
            .unwrap_or_else(|| UNVERSIONED.to_string())
    }

    /// When the current snapshot was published, `None` if nothing was loaded yet
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.load().loaded_at
    }

    pub fn stats(&self) -> ArchiveStats {
        self.snapshot.load().stats()
    }
}

impl RuleSource for RuleArchive {
    fn current_snapshot(&self) -> crate::Result<Arc<ArchiveSnapshot>> {
        Ok(self.snapshot())
    }
}
