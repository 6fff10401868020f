use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RaglineError, Result};

/// Top-level configuration for the ragline service.
///
/// Loaded from `~/.ragline/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaglineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl RaglineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RaglineConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RaglineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the persisted index and document manifest.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.ragline/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Corpus source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// CSV (with a `URL` column) or plain list of document URLs.
    pub url_file: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// User-Agent header sent with every fetch.
    pub user_agent: String,
    /// Upper bound on in-flight fetches during a refresh.
    pub max_concurrent_fetches: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            url_file: "urls.csv".to_string(),
            request_timeout_secs: 10,
            user_agent: concat!("ragline/", env!("CARGO_PKG_VERSION")).to_string(),
            max_concurrent_fetches: 8,
        }
    }
}

/// Which embedding implementation to load at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// ONNX Runtime sentence-transformer.
    Onnx,
    /// Deterministic hash vectors, no model files needed.
    Hash,
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model identifier recorded in persisted snapshots.
    pub model_id: String,
    /// Directory containing `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Output dimension for the hash backend. The ONNX backend reads it from the model.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Onnx,
            model_id: "all-MiniLM-L6-v2".to_string(),
            model_dir: "~/.ragline/models/all-MiniLM-L6-v2".to_string(),
            dimension: 384,
        }
    }
}

/// What a refresh does when a single document fails to embed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingFailurePolicy {
    /// Drop the document and keep going.
    #[default]
    Skip,
    /// Fail the whole refresh cycle.
    Abort,
}

/// Background refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between scheduled refreshes.
    pub interval_secs: u64,
    pub on_embedding_failure: EmbeddingFailurePolicy,
    /// Write the index and manifest to `data_dir` after each publish.
    pub persist: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            on_embedding_failure: EmbeddingFailurePolicy::Skip,
            persist: true,
        }
    }
}

/// Query-time configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of documents returned when the caller does not ask.
    pub default_k: usize,
    /// Upper bound on `k` accepted from callers.
    pub max_k: usize,
    /// Characters of context kept in a composed response.
    pub response_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 3,
            max_k: 50,
            response_chars: 500,
        }
    }
}

/// Delivery channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Chat endpoint URL. Responses are only logged when unset.
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: "RAGLINE_DELIVERY_TOKEN".to_string(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 3040 }
    }
}
