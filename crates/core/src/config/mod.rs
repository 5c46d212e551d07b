//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (ANJIN_*)
//! 2. TOML config file (if ANJIN_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::sources::{ChangelogSources, SourceDescriptor};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (ANJIN_*)
/// 2. TOML config file (if ANJIN_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the summarization endpoint.
    ///
    /// Set via ANJIN_OPENAI_API_KEY environment variable.
    /// Required only when summaries are requested outside debug mode.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Token for GitHub changelog sources. Anonymous requests when unset.
    ///
    /// Set via ANJIN_GITHUB_TOKEN environment variable.
    #[serde(default)]
    pub github_token: Option<String>,

    /// Consult and populate the changelog artifact cache.
    ///
    /// Set via ANJIN_USE_CACHE environment variable.
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Skip the LLM call; summaries become a fixed marker.
    ///
    /// Set via ANJIN_DEBUG environment variable.
    #[serde(default)]
    pub debug: bool,

    /// Root directory for persisted state.
    ///
    /// Set via ANJIN_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks. Must be below `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// File extensions (without the dot) included in a corpus scan.
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    /// Upper bound on concurrently running package tasks.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-call timeout for external collaborators in milliseconds.
    ///
    /// Set via ANJIN_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Chat model used for summaries.
    #[serde(default = "default_model")]
    pub model: String,

    /// Token cap for a single summary.
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: u32,

    /// Maximum code snippets handed to the summarizer.
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,

    /// Changelog source overrides, merged over the built-in registry.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceDescriptor>,
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".anjin_cache")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_file_extensions() -> Vec<String> {
    vec!["py".into()]
}

fn default_max_concurrency() -> usize {
    8
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_user_agent() -> String {
    "anjin/0.1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_max_summary_tokens() -> u32 {
    1024
}

fn default_max_snippets() -> usize {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            github_token: None,
            use_cache: true,
            debug: false,
            cache_dir: default_cache_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            file_extensions: default_file_extensions(),
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            model: default_model(),
            max_summary_tokens: default_max_summary_tokens(),
            max_snippets: default_max_snippets(),
            sources: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Directory holding the persisted index and the chunk database.
    pub fn index_dir(&self) -> PathBuf {
        self.cache_dir.join("index")
    }

    /// Directory holding one changelog cache file per package.
    pub fn changelog_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("changelogs")
    }

    /// Built-in source registry with configured overrides applied.
    pub fn changelog_sources(&self) -> ChangelogSources {
        let mut sources = ChangelogSources::builtin();
        for (package, descriptor) in &self.sources {
            sources.insert(package, descriptor.clone());
        }
        sources
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `ANJIN_`
    /// 2. TOML file from `ANJIN_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("ANJIN_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("ANJIN_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Summarizer credential, checked only when a real summary is needed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the key is not set.
    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "openai_api_key".into(),
            hint: "Set ANJIN_OPENAI_API_KEY or enable debug mode".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceKind;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.use_cache);
        assert!(!config.debug);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.file_extensions, vec!["py".to_string()]);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.user_agent, "anjin/0.1");
        assert!(config.cache_dir.ends_with(".anjin_cache"));
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_state_layout() {
        let config = AppConfig { cache_dir: PathBuf::from("/var/anjin"), ..Default::default() };
        assert_eq!(config.index_dir(), PathBuf::from("/var/anjin/index"));
        assert_eq!(config.changelog_cache_dir(), PathBuf::from("/var/anjin/changelogs"));
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_require_openai_api_key() {
        let config = AppConfig::default();
        assert!(matches!(config.require_openai_api_key(), Err(ConfigError::Missing { .. })));

        let config = AppConfig { openai_api_key: Some("sk-test".into()), ..Default::default() };
        assert_eq!(config.require_openai_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_source_overrides_win() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "requests".to_string(),
            SourceDescriptor { kind: SourceKind::Github, path: "HISTORY.md".into(), repo: Some("psf/requests".into()) },
        );
        let config = AppConfig { sources: overrides, ..Default::default() };

        let sources = config.changelog_sources();
        let requests = sources.get("requests").unwrap();
        assert_eq!(requests.kind, SourceKind::Github);
        assert!(sources.get("ruff").is_some());
    }
}
