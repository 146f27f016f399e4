//! HTTP API for the compliance engine
//!
//! # Routes
//!
//! - `GET /health` - Liveness plus archive version
//! - `GET /rules` - Rules of the current archive snapshot
//! - `GET /metrics` - Prometheus metrics
//! - `POST /govern/guard` - Guard-only check of a prompt (body: `{"content": "...", "actor": {...}}`)
//! - `POST /govern/compliance-cycle` - Full compliance cycle, returns the trace
//! - `POST /archive/reload` - Reload the rule archive from its configured sources
//!
//! # Example
//!
//! ```no_run
//! use charterguard::archive::RuleArchive;
//! use charterguard::engine::ComplianceEngine;
//! use charterguard::llm::{ConstitutionalJudge, RevisionEngine, SimulatedLlmClient};
//! use charterguard::server::{ArchiveSources, CharterServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let archive = Arc::new(RuleArchive::new());
//!     archive.load_defaults().expect("Failed to load defaults");
//!     let engine = ComplianceEngine::new(
//!         archive.clone(),
//!         Arc::new(ConstitutionalJudge::new(SimulatedLlmClient::new(), "sim")),
//!         Arc::new(RevisionEngine::new(SimulatedLlmClient::new(), "sim")),
//!     );
//!
//!     CharterServer::new(archive, engine, ArchiveSources::defaults_only())
//!         .run("127.0.0.1:8080")
//!         .await
//!         .expect("Server failed");
//! }
//! ```

use crate::archive::{ArchiveStats, RuleArchive, UNVERSIONED};
use crate::engine::{ComplianceEngine, ComplianceRequest, DEFAULT_MAX_RETRIES};
use crate::model::{Identity, Rule};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Default request body limit (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind error: {0}")]
    Bind(String),
}

/// Where `/archive/reload` reads rules from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSources {
    pub rules_dir: Option<PathBuf>,
    pub include_defaults: bool,
}

impl ArchiveSources {
    pub fn defaults_only() -> Self {
        Self {
            rules_dir: None,
            include_defaults: true,
        }
    }

    /// Load these sources into `archive`, replacing its snapshot on success
    pub fn load_into(&self, archive: &RuleArchive) -> crate::Result<ArchiveStats> {
        let stats = match (&self.rules_dir, self.include_defaults) {
            (Some(dir), true) => archive.load_with_defaults(dir)?,
            (Some(dir), false) => archive.load(dir)?,
            (None, true) => archive.load_defaults()?,
            (None, false) => {
                return Err(crate::ConstitutionError::Config(
                    "no rule sources configured: set rules_dir or include_defaults".to_string(),
                ))
            }
        };
        Ok(stats)
    }
}

/// Shared server state
struct AppState {
    archive: Arc<RuleArchive>,
    engine: ComplianceEngine,
    sources: ArchiveSources,
}

/// HTTP server wrapping a [`ComplianceEngine`]
pub struct CharterServer {
    state: Arc<AppState>,
    max_body_bytes: usize,
}

impl CharterServer {
    pub fn new(archive: Arc<RuleArchive>, engine: ComplianceEngine, sources: ArchiveSources) -> Self {
        Self {
            state: Arc::new(AppState {
                archive,
                engine,
                sources,
            }),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/rules", get(list_rules))
            .route("/metrics", get(metrics))
            .route("/govern/guard", post(check_guard))
            .route("/govern/compliance-cycle", post(compliance_cycle))
            .route("/archive/reload", post(reload_archive))
            .layer(axum::extract::DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(self.state.clone())
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(
            addr = addr,
            max_body_bytes = self.max_body_bytes,
            rules = self.state.archive.stats().rules,
            guard_rules = self.state.archive.snapshot().guard.active_rule_count(),
            "Compliance server listening"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(ServerError::Io)
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Body of `POST /govern/guard`
#[derive(Debug, Deserialize)]
pub struct GuardRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub actor: Option<Identity>,
}

/// Body of `POST /govern/compliance-cycle`
#[derive(Debug, Deserialize)]
pub struct CycleRequest {
    pub input_prompt: String,
    pub draft_response: String,
    #[serde(default)]
    pub context_tags: Option<Vec<String>>,
    #[serde(default)]
    pub actor: Option<Identity>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl From<CycleRequest> for ComplianceRequest {
    fn from(req: CycleRequest) -> Self {
        ComplianceRequest {
            input_prompt: req.input_prompt,
            draft: req.draft_response,
            context_tags: req.context_tags,
            actor: req.actor,
            max_retries: req.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }
}

#[derive(Debug, Serialize)]
struct RulesResponse {
    version: String,
    rules: Vec<Rule>,
}

#[derive(Debug, Serialize)]
struct ReloadResponse {
    version: String,
    #[serde(flatten)]
    stats: ArchiveStats,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "version": state.archive.version(),
        "loaded_at": state.archive.loaded_at().map(|t| t.to_rfc3339()),
    }))
}

async fn list_rules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.archive.snapshot();
    Json(RulesResponse {
        version: snapshot
            .version
            .clone()
            .unwrap_or_else(|| UNVERSIONED.to_string()),
        rules: snapshot.rules.clone(),
    })
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::encode_metrics(),
    )
}

async fn check_guard(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GuardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing 'content' field"))?;

    match state.archive.snapshot().guard.check(&content, req.actor.as_ref()) {
        Ok(()) => Ok(Json(serde_json::json!({ "status": "allowed" }))),
        Err(violation) => Err(api_error(StatusCode::FORBIDDEN, violation.to_string())),
    }
}

async fn compliance_cycle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CycleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = ComplianceRequest::from(req);
    let trace = state
        .engine
        .run_compliance_cycle(&request)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Compliance cycle failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(trace))
}

async fn reload_archive(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.sources.load_into(&state.archive).map_err(|e| {
        tracing::warn!(error = %e, "Archive reload rejected; keeping previous snapshot");
        api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    })?;

    Ok(Json(ReloadResponse {
        version: state.archive.version(),
        stats,
    }))
}
