//! charterguard configuration
//!
//! Loaded from `~/.config/charterguard/config.yaml` unless a path is given.
//! Every field has a default, so an empty file (or no file) is a valid setup
//! that runs the built-in rules against the simulated client.

use crate::{ConstitutionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Which chat-completion backend drives the judge and the reviser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Deterministic offline client
    #[default]
    Simulated,
    /// OpenAI-compatible HTTP service
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL of the service; `/chat/completions` is appended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharterConfig {
    /// Directory of JSON/YAML rule files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_dir: Option<PathBuf>,

    /// Load the built-in rule set alongside `rules_dir`
    #[serde(default = "default_true")]
    pub include_defaults: bool,

    /// Revision attempts per compliance cycle
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for CharterConfig {
    fn default() -> Self {
        Self {
            rules_dir: None,
            include_defaults: true,
            max_retries: default_max_retries(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl CharterConfig {
    /// Load from the default path, falling back to defaults when it does not exist
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConstitutionError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading charterguard configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;

        tracing::debug!(
            rules_dir = ?config.rules_dir,
            include_defaults = config.include_defaults,
            provider = ?config.llm.provider,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %path.display(), "Saving charterguard configuration");
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// `~/.config/charterguard/config.yaml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("charterguard");
        path.push("config.yaml");
        path
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(ConstitutionError::Config(
                "llm.model must not be empty".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConstitutionError::Config(
                "llm.timeout_secs must be greater than zero".to_string(),
            ));
        }
        self.server_addr()?;
        Ok(())
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        self.server.addr.parse().map_err(|e| {
            ConstitutionError::Config(format!(
                "invalid server.addr '{}': {}",
                self.server.addr, e
            ))
        })
    }
}
