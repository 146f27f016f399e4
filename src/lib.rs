//! charterguard - Constitutional compliance engine for LLM output
//!
//! charterguard screens requests against regex guard rules, judges draft
//! responses against a versioned archive of rules, and drives an
//! evaluate→revise loop until the output complies or the attempts run out.
//! Every request ends in an auditable [`ComplianceTrace`](model::ComplianceTrace)
//! with one of three dispositions: Approved, Revised or Blocked.
//!
//! # Architecture
//!
//! - **model**: Rules, guard rules, references, critiques and traces
//! - **archive**: JSON/YAML rule loading and atomic snapshot publication
//! - **guard**: Pre-generation regex screening with group exemptions
//! - **engine**: The guard → fetch → evaluate → revise cycle
//! - **llm**: Judge and reviser over a chat-completion client
//! - **diff**: Unified diff between draft and revision
//! - **server**: HTTP API (axum)
//! - **config**: YAML configuration

// Core modules
pub mod config;
pub mod error;
pub mod model;

// Components
pub mod archive;
pub mod diff;
pub mod engine;
pub mod guard;
pub mod llm;
pub mod server;

// Infrastructure
pub mod logging;
pub mod metrics;

// Re-exports
pub use error::{ArchiveError, ConstitutionError, Result};
