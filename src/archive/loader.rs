//! Building archive snapshots from data files

use super::artifact::{decode_document, Artifact, Document};
use super::ArchiveSnapshot;
use crate::error::{ArchiveError, ArtifactKind};
use crate::guard::{compile_pattern, Guard};
use crate::model::{GuardRule, Reference, Rule};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Data file formats the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }
}

/// Accumulates artifacts from any number of sources into one snapshot
///
/// Ids are unique per artifact kind across everything added to the builder.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    rules: Vec<Rule>,
    guard_rules: Vec<GuardRule>,
    references: Vec<Reference>,
    version: Option<String>,
    rule_ids: HashSet<String>,
    guard_rule_ids: HashSet<String>,
    reference_ids: HashSet<String>,
    files: usize,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every `.json`, `.yaml` and `.yml` file under `root`, in file-name order
    pub fn add_dir(&mut self, root: &Path) -> Result<(), ArchiveError> {
        if !root.is_dir() {
            return Err(ArchiveError::NotFound(root.to_path_buf()));
        }

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                ArchiveError::Io {
                    path,
                    source: e.into(),
                }
            })?;

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(format) = Format::from_path(entry.path()) else {
                tracing::trace!(path = %entry.path().display(), "Skipping non-data file");
                continue;
            };

            let content =
                std::fs::read_to_string(entry.path()).map_err(|source| ArchiveError::Io {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
            self.add_source(entry.path(), &content, format)?;
        }

        Ok(())
    }

    /// Parse one document and add its artifacts
    ///
    /// `path` is only used to label errors.
    pub fn add_source(
        &mut self,
        path: &Path,
        content: &str,
        format: Format,
    ) -> Result<(), ArchiveError> {
        let value: serde_json::Value = match format {
            Format::Json => serde_json::from_str(content).map_err(|e| ArchiveError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            Format::Yaml => serde_yaml::from_str(content).map_err(|e| ArchiveError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
        };

        let document = decode_document(value).map_err(|message| ArchiveError::Validation {
            path: path.to_path_buf(),
            message,
        })?;

        tracing::debug!(
            path = %path.display(),
            artifacts = document.artifacts.len(),
            "Parsed archive document"
        );
        self.add_document(path, document)
    }

    fn add_document(&mut self, path: &Path, document: Document) -> Result<(), ArchiveError> {
        self.files += 1;
        if document.version.is_some() {
            self.version = document.version;
        }

        for artifact in document.artifacts {
            match artifact {
                Artifact::Rule(rule) => {
                    register(&mut self.rule_ids, ArtifactKind::Rule, &rule.id, path)?;
                    self.rules.push(rule);
                }
                Artifact::GuardRule(rule) => {
                    // Dropped rules still claim their id
                    register(&mut self.guard_rule_ids, ArtifactKind::GuardRule, &rule.id, path)?;
                    if let Err(e) = compile_pattern(&rule.pattern) {
                        tracing::warn!(
                            path = %path.display(),
                            rule_id = %rule.id,
                            error = %e,
                            "Dropping guard rule with invalid pattern"
                        );
                        continue;
                    }
                    self.guard_rules.push(rule);
                }
                Artifact::Reference(reference) => {
                    register(
                        &mut self.reference_ids,
                        ArtifactKind::Reference,
                        &reference.id,
                        path,
                    )?;
                    self.references.push(reference);
                }
            }
        }

        Ok(())
    }

    pub fn files(&self) -> usize {
        self.files
    }

    /// Finish the snapshot, compiling its guard from the collected guard rules
    pub fn build(self) -> ArchiveSnapshot {
        ArchiveSnapshot {
            guard: Guard::new(&self.guard_rules),
            rules: self.rules,
            guard_rules: self.guard_rules,
            references: self.references,
            version: self.version,
            loaded_at: Some(chrono::Utc::now()),
        }
    }
}

fn register(
    seen: &mut HashSet<String>,
    kind: ArtifactKind,
    id: &str,
    path: &Path,
) -> Result<(), ArchiveError> {
    if !seen.insert(id.to_string()) {
        return Err(ArchiveError::DuplicateId {
            kind,
            id: id.to_string(),
            path: PathBuf::from(path),
        });
    }
    Ok(())
}
