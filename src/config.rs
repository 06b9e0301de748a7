use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::RagError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GroundworkConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub governor: GovernorConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding the persisted usage/budget state.
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    /// Model substituted for expensive models on small requests.
    pub cheap_model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub small_request_chars: usize,
    pub large_context_chars: usize,
    pub large_context_max_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GovernorConfig {
    /// Maximum estimated spend per UTC day, in USD.
    pub daily_budget: f64,
    pub max_daily_chat_requests: usize,
    pub max_daily_embedding_requests: usize,
    pub rate_limit_backoff_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Fraction of a limit at which warnings start (0.0-1.0).
    pub warning_ratio: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub expiration_hours: i64,
    pub max_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub base_url: String,
    pub namespace: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_max_results: usize,
    pub min_similarity: f64,
    pub context_max_length: usize,
    /// Confidence floor applied at the index when a health context is supplied.
    pub health_confidence_floor: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7340,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_groundwork_dir()
            .join("usage.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            cheap_model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            temperature: 0.7,
            max_tokens: 800,
            small_request_chars: 500,
            large_context_chars: 6000,
            large_context_max_tokens: 500,
        }
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            daily_budget: 5.0,
            max_daily_chat_requests: 500,
            max_daily_embedding_requests: 2000,
            rate_limit_backoff_seconds: 2,
            request_timeout_seconds: 30,
            warning_ratio: 0.8,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_hours: 24,
            max_size: 1000,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            namespace: "health-knowledge".into(),
            api_key: String::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: 5,
            min_similarity: 0.7,
            context_max_length: 4000,
            health_confidence_floor: 0.8,
        }
    }
}

/// Returns `~/.groundwork/`
pub fn default_groundwork_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".groundwork")
}

/// Returns the default config file path: `~/.groundwork/config.toml`
pub fn default_config_path() -> PathBuf {
    default_groundwork_dir().join("config.toml")
}

impl GroundworkConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            GroundworkConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `OPENAI_API_KEY` fills both provider keys when they are not set in the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GROUNDWORK_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("GROUNDWORK_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            if self.embedding.api_key.is_empty() {
                self.embedding.api_key = val.clone();
            }
            if self.completion.api_key.is_empty() {
                self.completion.api_key = val;
            }
        }
        if let Ok(val) = std::env::var("GROUNDWORK_INDEX_URL") {
            self.index.base_url = val;
        }
        if let Ok(val) = std::env::var("GROUNDWORK_INDEX_API_KEY") {
            self.index.api_key = val;
        }
        if let Ok(val) = std::env::var("GROUNDWORK_DAILY_BUDGET") {
            match val.parse::<f64>() {
                Ok(budget) => self.governor.daily_budget = budget,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid GROUNDWORK_DAILY_BUDGET"),
            }
        }
    }

    /// Check that every key needed to reach the providers and the index is present.
    pub fn validate(&self) -> std::result::Result<(), RagError> {
        let required = [
            ("embedding.api_key", &self.embedding.api_key),
            ("completion.api_key", &self.completion.api_key),
            ("index.base_url", &self.index.base_url),
            ("index.api_key", &self.index.api_key),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(RagError::Config(format!("missing required setting `{name}`")));
        }
        if self.governor.daily_budget <= 0.0 {
            return Err(RagError::Config("governor.daily_budget must be positive".into()));
        }
        if self.cache.max_size == 0 {
            return Err(RagError::Config("cache.max_size must be at least 1".into()));
        }
        if self.cache.expiration_hours <= 0 {
            return Err(RagError::Config("cache.expiration_hours must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.governor.warning_ratio) {
            return Err(RagError::Config(
                "governor.warning_ratio must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> GroundworkConfig {
        let mut config = GroundworkConfig::default();
        config.embedding.api_key = "sk-embed".into();
        config.completion.api_key = "sk-chat".into();
        config.index.base_url = "https://index.example".into();
        config.index.api_key = "idx-key".into();
        config
    }

    #[test]
    fn default_config_is_valid() {
        let config = GroundworkConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.cache.expiration_hours, 24);
        assert_eq!(config.governor.warning_ratio, 0.8);
        assert_eq!(config.retrieval.health_confidence_floor, 0.8);
        assert!(config.storage.db_path.ends_with("usage.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[governor]
daily_budget = 1.5
max_daily_chat_requests = 10

[cache]
max_size = 64

[index]
base_url = "https://my-index.svc"
namespace = "nutrition"
"#;
        let config: GroundworkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.governor.daily_budget, 1.5);
        assert_eq!(config.governor.max_daily_chat_requests, 10);
        assert_eq!(config.cache.max_size, 64);
        assert_eq!(config.index.namespace, "nutrition");
        // defaults still apply for unset fields
        assert_eq!(config.governor.max_daily_embedding_requests, 2000);
        assert_eq!(config.cache.expiration_hours, 24);
    }

    #[test]
    fn validate_reports_missing_key() {
        let mut config = configured();
        assert!(config.validate().is_ok());

        config.index.api_key.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("index.api_key")));
    }

    #[test]
    fn validate_rejects_non_positive_budget() {
        let mut config = configured();
        config.governor.daily_budget = 0.0;
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_cache_ttl_and_warning_ratio() {
        let mut config = configured();
        config.cache.expiration_hours = -1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("expiration_hours")));

        let mut config = configured();
        config.governor.warning_ratio = 1.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("warning_ratio")));

        let mut config = configured();
        config.governor.warning_ratio = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = GroundworkConfig::default();
        std::env::set_var("GROUNDWORK_DB", "/tmp/override.db");
        std::env::set_var("GROUNDWORK_LOG_LEVEL", "trace");
        std::env::set_var("GROUNDWORK_INDEX_URL", "https://env-index.svc");
        std::env::set_var("GROUNDWORK_DAILY_BUDGET", "2.25");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.index.base_url, "https://env-index.svc");
        assert_eq!(config.governor.daily_budget, 2.25);

        // Clean up
        std::env::remove_var("GROUNDWORK_DB");
        std::env::remove_var("GROUNDWORK_LOG_LEVEL");
        std::env::remove_var("GROUNDWORK_INDEX_URL");
        std::env::remove_var("GROUNDWORK_DAILY_BUDGET");
    }
}
