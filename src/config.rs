//! TOML configuration.
//!
//! Only `[db]`, `[corpus]` and `[index].path` are required; every other
//! setting has a default. See `config/rolesearch.example.toml`.

use anyhow::{bail, Context, Result};
use rolesearch_core::embedding::{default_phrase_boosts, PhraseBoost};
use rolesearch_core::{IndexConfig, SimilarityOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    pub index: IndexSettings,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Chunk JSON written by the ingestion step.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexSettings {
    /// Where the built index bundle is stored.
    pub path: PathBuf,
    #[serde(default = "default_vocab_size")]
    pub vocab_size: usize,
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default)]
    pub enhanced_similarity: bool,
    /// Replaces the built-in phrase table when present.
    #[serde(default)]
    pub phrase_boosts: Option<Vec<PhraseBoost>>,
}

fn default_vocab_size() -> usize {
    1000
}
fn default_vector_dim() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Role granted to unknown users. Unset means unknown users get 404.
    #[serde(default)]
    pub fallback_role: Option<String>,
    /// Accepted `X-API-Key` values. Empty disables the check.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
            fallback_role: None,
            api_keys: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// Per-user requests in any 60 second window. `0` disables limiting.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_requests_per_minute() -> usize {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Build parameters for the core index.
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            vocab_size: self.index.vocab_size,
            vector_dim: self.index.vector_dim,
            phrase_boosts: self
                .index
                .phrase_boosts
                .clone()
                .unwrap_or_else(default_phrase_boosts),
        }
    }

    pub fn similarity_options(&self) -> SimilarityOptions {
        SimilarityOptions {
            enhanced: self.index.enhanced_similarity,
        }
    }

    pub fn auth_enabled(&self) -> bool {
        !self.server.api_keys.is_empty()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.index.vocab_size == 0 {
        bail!("index.vocab_size must be > 0");
    }
    if config.index.vector_dim < 3 {
        bail!("index.vector_dim must be >= 3");
    }
    if let Some(boosts) = &config.index.phrase_boosts {
        for boost in boosts {
            if boost.phrase.trim().is_empty() {
                bail!("index.phrase_boosts entries must have a non-empty phrase");
            }
            if boost.weights.iter().any(|w| !w.is_finite()) {
                bail!(
                    "index.phrase_boosts weights for '{}' must be finite",
                    boost.phrase
                );
            }
        }
    }

    if config.retrieval.default_top_k < 1 {
        bail!("retrieval.default_top_k must be >= 1");
    }

    if config.server.bind.trim().is_empty() {
        bail!("server.bind must not be empty");
    }
    if config.server.request_timeout_secs == 0 {
        bail!("server.request_timeout_secs must be > 0");
    }
    if let Some(role) = &config.server.fallback_role {
        if role.trim().is_empty() {
            bail!("server.fallback_role must not be empty when set");
        }
    }
    if config.server.api_keys.iter().any(|k| k.trim().is_empty()) {
        bail!("server.api_keys must not contain empty keys");
    }

    Ok(config)
}
