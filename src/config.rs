//! Service configuration loaded from TOML.

use crate::error::GateConfigError;
use crate::rate_limit::AdmissionGate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable holding the remote model API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Errors raised while loading or validating configuration. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid admission gate config: {0}")]
    Gate(#[from] GateConfigError),
    #[error("answer_mode = \"remote\" requires OPENAI_API_KEY to be set")]
    MissingApiKey,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub answer_mode: AnswerModeKind,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub query_log: QueryLogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// How questions are answered. Chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerModeKind {
    /// Ask the hosted language model.
    Remote,
    /// Look the question up in the local knowledge base.
    #[default]
    Local,
}

/// Admission gate sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Bucket size, i.e. the burst allowance.
    #[serde(default = "default_capacity", alias = "tokens")]
    pub capacity: f64,
    /// Sustained rate in tokens per second.
    #[serde(default = "default_refill_rate", alias = "refill_rate")]
    pub refill_rate_per_second: f64,
    /// Accepted for compatibility but has no effect on refill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refill_period: Option<f64>,
}

/// Hosted language model settings. The API key comes from [`API_KEY_ENV`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_path")]
    pub path: PathBuf,
}

/// Where answered queries are recorded. Without a `path` records stay in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate_per_second: default_refill_rate(),
            refill_period: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self { path: default_kb_path() }
    }
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self { path: None, memory_capacity: default_memory_capacity() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_capacity() -> f64 {
    20.0
}

fn default_refill_rate() -> f64 {
    5.0
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_system_prompt() -> String {
    "You are a helpful FAQ assistant.".to_string()
}

fn default_kb_path() -> PathBuf {
    PathBuf::from("knowledge_base/faq.json")
}

fn default_memory_capacity() -> usize {
    10_000
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the gate parameters and warn about settings that are ignored.
    pub fn validate(&self) -> Result<(), ConfigError> {
        AdmissionGate::from_config(&self.gate).map(drop)?;
        if let Some(period) = self.gate.refill_period {
            tracing::warn!(
                refill_period = period,
                "gate.refill_period is ignored; refill is continuous at refill_rate_per_second"
            );
        }
        Ok(())
    }

    /// Resolve the API key required by the configured answer mode.
    ///
    /// Returns `Ok(None)` in local mode, where no key is needed.
    pub fn resolve_api_key(&self, env_value: Option<String>) -> Result<Option<String>, ConfigError> {
        match self.answer_mode {
            AnswerModeKind::Local => Ok(None),
            AnswerModeKind::Remote => env_value
                .filter(|key| !key.trim().is_empty())
                .map(Some)
                .ok_or(ConfigError::MissingApiKey),
        }
    }
}
