//! Configuration types for catalog-qa.
//!
//! Config is loaded once at startup from a TOML file and validated before the
//! server opens any ports. Invalid configs are rejected with a clear error
//! rather than silently falling back to defaults. The provider API key is
//! never stored in the file — only the name of the environment variable that
//! holds it.
//!
//! # Example
//! ```toml
//! [server]
//! port = 8080
//!
//! [provider]
//! api_key_env = "OPENAI_API_KEY"
//! model       = "gpt-5-nano"
//! mode        = "streaming"
//!
//! [catalog]
//! movies_path = "data/movies.json"
//! films_path  = "data/films.json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// The single LLM provider this deployment talks to.
    pub provider: ProviderConfig,

    /// Locations of the two catalog source files.
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.provider.base_url.trim().is_empty(),
            "provider.base_url must not be empty"
        );
        anyhow::ensure!(
            !self.provider.api_key_env.trim().is_empty(),
            "provider.api_key_env must not be empty"
        );
        anyhow::ensure!(
            !self.provider.model.trim().is_empty(),
            "provider.model must not be empty"
        );
        anyhow::ensure!(
            self.limits.question_max_chars > 0,
            "limits.question_max_chars must be greater than zero"
        );
        anyhow::ensure!(
            self.limits.description_max_chars > 0,
            "limits.description_max_chars must be greater than zero"
        );
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port the public API listens on (default: 8080).
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Log level override (also controlled by `RUST_LOG` env var).
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: defaults::port(), log_level: None }
    }
}

/// The OpenAI-compatible chat completions provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Base URL without the `/v1/...` path suffix (default: the OpenAI API).
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Environment variable name whose value is the API key.
    ///
    /// Resolved per request; a missing variable is a configuration error
    /// surfaced before any network call is made.
    pub api_key_env: String,

    /// Model identifier sent with every completion request.
    pub model: String,

    /// Whether answers are buffered or relayed incrementally.
    ///
    /// A deployment-time decision: the endpoint's response shape depends on it
    /// (`{"answer": ...}` JSON vs. a chunked text stream).
    #[serde(default)]
    pub mode: Mode,

    /// Request timeout for buffered completion calls in milliseconds
    /// (default: 30 000). Streaming calls carry only a connect timeout, since
    /// generation time is unbounded by design.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Completion token budget in buffered mode (default: 256).
    #[serde(default = "defaults::max_tokens")]
    pub max_tokens: u32,

    /// Completion token budget in streaming mode (default: 512).
    #[serde(default = "defaults::stream_max_tokens")]
    pub stream_max_tokens: u32,

    /// Optional reasoning-effort hint, attached only to streaming requests.
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

/// Paths to the two catalog source files, concatenated in this order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    pub movies_path: PathBuf,
    pub films_path: PathBuf,
}

/// Input and prompt size bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum question length in characters (default: 500).
    #[serde(default = "defaults::question_max_chars")]
    pub question_max_chars: usize,

    /// Per-entry description cap in the catalog context (default: 120).
    #[serde(default = "defaults::description_max_chars")]
    pub description_max_chars: usize,

    /// Soft size threshold for the assembled system prompt in characters
    /// (default: 24 000). Exceeding it logs a warning; the prompt is never
    /// truncated, since dropping catalog entries would make "this title does
    /// not exist" answers non-deterministic.
    #[serde(default = "defaults::prompt_warn_chars")]
    pub prompt_warn_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            question_max_chars: defaults::question_max_chars(),
            description_max_chars: defaults::description_max_chars(),
            prompt_warn_chars: defaults::prompt_warn_chars(),
        }
    }
}

/// How the model's answer reaches the caller.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Await the full provider response, return one JSON answer.
    #[default]
    Buffered,

    /// Relay the provider's SSE deltas to the caller as they arrive.
    Streaming,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Buffered => "buffered",
            Self::Streaming => "streaming",
        })
    }
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn base_url() -> String { "https://api.openai.com".to_string() }
    pub fn timeout_ms() -> u64 { 30_000 }
    pub fn max_tokens() -> u32 { 256 }
    pub fn stream_max_tokens() -> u32 { 512 }
    pub fn question_max_chars() -> usize { 500 }
    pub fn description_max_chars() -> usize { 120 }
    pub fn prompt_warn_chars() -> usize { 24_000 }
}
