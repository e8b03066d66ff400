//! Configuration module for the search read-path.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RAGSEARCH_` and use double
//! underscores to separate nested levels:
//! - `RAGSEARCH_SEARCH__TABLE_NAME=chunks` sets `search.table_name`
//! - `RAGSEARCH_RETRY__MAX_RETRIES=5` sets `retry.max_retries`
//! - `RAGSEARCH_LOGGING__JSON=true` sets `logging.json`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the settings file, searched upward from the cwd.
pub const CONFIG_DIR: &str = ".ragsearch";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RAGSEARCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Search pipeline settings
    #[serde(default)]
    pub search: SearchSettings,

    /// Backoff for embedding and store calls
    #[serde(default)]
    pub retry: RetrySettings,

    /// Local embedding model
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchSettings {
    /// Table or collection holding document chunks
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Results returned when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Similarity threshold used when the caller gives none
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// Searches slower than this emit a performance warning
    #[serde(default = "default_performance_threshold_ms")]
    pub performance_threshold_ms: u64,

    /// Upper bound for a single embedding or store call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Expected embedding dimension, checked on every query vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dimension: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay after the first failure
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where downloaded model files are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_false")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per event
    #[serde(default = "default_false")]
    pub json: bool,
}

fn default_version() -> u32 {
    1
}
fn default_table_name() -> String {
    "document_chunks".to_string()
}
fn default_limit() -> usize {
    crate::search::query::DEFAULT_LIMIT
}
fn default_threshold() -> f64 {
    crate::search::query::DEFAULT_SIMILARITY_THRESHOLD
}
fn default_performance_threshold_ms() -> u64 {
    500
}
fn default_call_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
        .join("ragsearch")
        .join("models")
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            search: SearchSettings::default(),
            retry: RetrySettings::default(),
            embedding: EmbeddingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            default_limit: default_limit(),
            default_threshold: default_threshold(),
            performance_threshold_ms: default_performance_threshold_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            embedding_dimension: None,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: default_cache_dir(),
            show_download_progress: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay inside field names.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.ragsearch/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Check that a settings file exists and parses
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Cannot read configuration file: {e}"))?;
        toml::from_str::<Settings>(&content).map_err(|e| {
            format!(
                "Configuration file is corrupted: {e}\nRun 'ragsearch init --force' to regenerate."
            )
        })?;

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write a commented settings template to `.ragsearch/settings.toml`
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_at(PathBuf::from(CONFIG_DIR).join("settings.toml"), force)
    }

    /// Write the settings template to an explicit path
    pub fn init_config_file_at(
        config_path: PathBuf,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let defaults = Settings::default();
        let template = format!(
            r#"# ragsearch configuration

# Version of the configuration schema
version = 1

[search]
# Table or collection holding document chunks
table_name = "{table}"

# Results returned when no limit is given (1-100)
default_limit = {limit}

# Minimum cosine similarity (0.0-1.0)
default_threshold = {threshold}

# Searches slower than this log a performance warning
performance_threshold_ms = {perf}

# Upper bound for a single embedding or store call
call_timeout_ms = {timeout}

# Expected embedding dimension (unset = use the store's or provider's)
# embedding_dimension = 384

[retry]
# Retry transient embedding and store failures with exponential backoff
enabled = true
max_retries = {retries}
base_delay_ms = {base}
max_delay_ms = {max}

[embedding]
# Model used for query embeddings
# Options: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small
model = "{model}"

# Where model files are downloaded
cache_dir = "{cache}"
show_download_progress = false

[logging]
# Default level when RUST_LOG is unset
level = "{level}"

# One JSON object per log event
json = false
"#,
            table = defaults.search.table_name,
            limit = defaults.search.default_limit,
            threshold = defaults.search.default_threshold,
            perf = defaults.search.performance_threshold_ms,
            timeout = defaults.search.call_timeout_ms,
            retries = defaults.retry.max_retries,
            base = defaults.retry.base_delay_ms,
            max = defaults.retry.max_delay_ms,
            model = defaults.embedding.model,
            cache = defaults.embedding.cache_dir.display().to_string().replace('\\', "/"),
            level = defaults.logging.level,
        );

        std::fs::write(&config_path, template)?;

        Ok(config_path)
    }
}
