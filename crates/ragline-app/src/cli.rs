//! CLI argument definitions for the Ragline binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use ragline_core::config::RaglineConfig;

/// Ragline - retrieves the documents most relevant to a question from a
/// periodically refreshed web corpus.
#[derive(Parser, Debug)]
#[command(name = "ragline", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the persisted index and document manifest.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// URL list to ingest (CSV with a URL column, or one URL per line).
    #[arg(short = 'u', long = "urls")]
    pub urls: Option<PathBuf>,

    /// Answer a single question and exit instead of serving the API.
    #[arg(short = 'q', long = "query")]
    pub query: Option<String>,

    /// Number of documents to retrieve for --query.
    #[arg(short = 'k', long = "k")]
    pub k: Option<usize>,

    /// Deliver the --query response to this user instead of printing it.
    #[arg(long = "user-id", requires = "query")]
    pub user_id: Option<String>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long = "write-config", conflicts_with = "query")]
    pub write_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > RAGLINE_CONFIG env var > ~/.ragline/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("RAGLINE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > RAGLINE_PORT env var > config file value > 3040.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("RAGLINE_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        3040
    }

    /// Resolve the data directory path.
    ///
    /// Returns `None` if not overridden (use config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the URL list path.
    ///
    /// Returns `None` if not overridden (use config value).
    pub fn resolve_url_file(&self) -> Option<String> {
        self.urls.as_ref().map(|p| p.to_string_lossy().to_string())
    }

    /// Apply the path overrides given on the command line to `config`.
    pub fn apply_overrides(&self, config: &mut RaglineConfig) {
        if let Some(data_dir) = self.resolve_data_dir() {
            config.general.data_dir = data_dir;
        }
        if let Some(url_file) = self.resolve_url_file() {
            config.corpus.url_file = url_file;
        }
    }

    /// Resolve the log level.
    ///
    /// Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".ragline").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ragline").join("config.toml");
    }
    PathBuf::from("config.toml")
}
