//! Configuration loading, validation, and management for ctxpack.
//!
//! Loads configuration from `~/.ctxpack/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.ctxpack/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tokenizer backend selection
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Token count cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Packing defaults
    #[serde(default)]
    pub assembler: AssemblerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// "whitespace" or "huggingface"
    #[serde(default = "default_tokenizer_backend")]
    pub backend: String,

    /// Hub revision used by the huggingface backend
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Override for the Hub download cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

fn default_tokenizer_backend() -> String {
    "whitespace".into()
}
fn default_revision() -> String {
    "main".into()
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            backend: default_tokenizer_backend(),
            revision: default_revision(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "memory" or "none"
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// Default TTL for entries written without one (0 = until invalidated)
    #[serde(default)]
    pub default_ttl_secs: u64,

    /// TTL for aggregate conversation counts
    #[serde(default = "default_conversation_ttl")]
    pub conversation_ttl_secs: u64,
}

fn default_cache_backend() -> String {
    "memory".into()
}
fn default_conversation_ttl() -> u64 {
    3600
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }

    pub fn conversation_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            default_ttl_secs: 0,
            conversation_ttl_secs: default_conversation_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Tokens held back for the generation marker and postfix
    #[serde(default = "default_reserved_overhead")]
    pub reserved_overhead: usize,

    /// Model used when a command does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    #[serde(default = "default_max_generation_tokens")]
    pub max_generation_tokens: usize,
}

fn default_reserved_overhead() -> usize {
    50
}
fn default_model() -> String {
    "Qwen/Qwen2-0.5B-Instruct".into()
}
fn default_max_context_tokens() -> usize {
    4096
}
fn default_max_generation_tokens() -> usize {
    512
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            reserved_overhead: default_reserved_overhead(),
            default_model: default_model(),
            max_context_tokens: default_max_context_tokens(),
            max_generation_tokens: default_max_generation_tokens(),
        }
    }
}

const TOKENIZER_BACKENDS: &[&str] = &["whitespace", "huggingface"];
const CACHE_BACKENDS: &[&str] = &["memory", "none"];

impl AppConfig {
    /// Load configuration from the default path (~/.ctxpack/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `CTXPACK_MODEL`
    /// - `CTXPACK_TOKENIZER_BACKEND`
    /// - `CTXPACK_CACHE_BACKEND`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("CTXPACK_MODEL") {
            config.assembler.default_model = model;
        }
        if let Ok(backend) = std::env::var("CTXPACK_TOKENIZER_BACKEND") {
            config.tokenizer.backend = backend;
        }
        if let Ok(backend) = std::env::var("CTXPACK_CACHE_BACKEND") {
            config.cache.backend = backend;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ctxpack")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !TOKENIZER_BACKENDS.contains(&self.tokenizer.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown tokenizer backend '{}' (expected one of: {})",
                self.tokenizer.backend,
                TOKENIZER_BACKENDS.join(", ")
            )));
        }

        if !CACHE_BACKENDS.contains(&self.cache.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown cache backend '{}' (expected one of: {})",
                self.cache.backend,
                CACHE_BACKENDS.join(", ")
            )));
        }

        if self.cache.conversation_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.conversation_ttl_secs must be > 0".into(),
            ));
        }

        let a = &self.assembler;
        if a.max_context_tokens <= a.max_generation_tokens + a.reserved_overhead {
            return Err(ConfigError::ValidationError(format!(
                "assembler.max_context_tokens ({}) must exceed max_generation_tokens ({}) + reserved_overhead ({})",
                a.max_context_tokens, a.max_generation_tokens, a.reserved_overhead
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
