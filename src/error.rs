//! Error types for charterguard
//!
//! Defines the crate-wide error enum plus the archive load error taxonomy.
//! Blocking outcomes (guard matches, exhausted revisions) are NOT errors: they
//! surface as a `Blocked` trace. Only fail-stop conditions travel through here.

use crate::llm::retry::{RetryDecision, RetryableError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for charterguard operations
pub type Result<T> = std::result::Result<T, ConstitutionError>;

/// Artifact kinds tracked by the archive, used in duplicate-id reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Rule,
    GuardRule,
    Reference,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactKind::Rule => "Rule",
            ArtifactKind::GuardRule => "Guard Rule",
            ArtifactKind::Reference => "Reference",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while loading the rule archive
///
/// Any of these aborts the whole load; the previously published snapshot is kept.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive root does not exist
    #[error("Directory not found: {0}")]
    NotFound(PathBuf),

    /// A file could not be read or the directory could not be walked
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file is not valid JSON/YAML
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A document parsed but an element failed structural or field validation
    #[error("Validation failed for {path}: {message}")]
    Validation { path: PathBuf, message: String },

    /// The same id appeared twice for one artifact kind
    #[error("Duplicate {kind} ID detected: {id} (in {path})")]
    DuplicateId {
        kind: ArtifactKind,
        id: String,
        path: PathBuf,
    },

    /// The backing store failed while serving a query
    #[error("Archive unavailable: {0}")]
    Unavailable(String),
}

/// Comprehensive error type for charterguard operations
#[derive(Error, Debug)]
pub enum ConstitutionError {
    /// Rule archive errors (load-time integrity or query-time availability)
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Revision failures reported by a reviser
    #[error("Revision error: {0}")]
    Revision(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Rate limited (with optional retry-after duration in seconds)
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl RetryableError for ConstitutionError {
    fn retry_decision(&self) -> RetryDecision {
        use std::time::Duration;

        match self {
            ConstitutionError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    RetryDecision::Retry
                } else if let Some(status) = e.status() {
                    match status.as_u16() {
                        429 => RetryDecision::RetryAfter(Duration::from_secs(30)),
                        500..=599 => RetryDecision::Retry,
                        _ => RetryDecision::NoRetry,
                    }
                } else {
                    RetryDecision::Retry
                }
            }
            ConstitutionError::RateLimited(secs) => {
                RetryDecision::RetryAfter(Duration::from_secs(*secs))
            }
            ConstitutionError::Llm(msg) => {
                if msg.contains("timeout") || msg.contains("connection") {
                    RetryDecision::Retry
                } else {
                    RetryDecision::NoRetry
                }
            }
            ConstitutionError::Archive(_)
            | ConstitutionError::Config(_)
            | ConstitutionError::Revision(_)
            | ConstitutionError::Server(_)
            | ConstitutionError::Io(_)
            | ConstitutionError::Json(_)
            | ConstitutionError::Yaml(_)
            | ConstitutionError::Other(_)
            | ConstitutionError::Anyhow(_) => RetryDecision::NoRetry,
        }
    }
}
