//! Configuration management
//!
//! Loads the TOML configuration, applies profile and environment overrides and
//! validates the result before any engine component is constructed.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub persistence: PersistenceConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "fastembed" or "hashing"
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
    /// Upper bound for one embedding call, e.g. "30s". Empty disables it.
    #[serde(default)]
    pub timeout: String,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    /// "l2" (squared Euclidean) or "cosine"
    pub metric: String,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_max_layer: usize,
    pub hnsw_capacity: usize,
    /// 0 means unlimited
    #[serde(default)]
    pub max_documents: usize,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub hybrid_by_default: bool,
    pub hnsw_ef_search: usize,
}

/// Snapshot persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub flush_retries: usize,
}

/// Ingestion transports configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub extensions: Vec<String>,
    pub stream_buffer: usize,
    pub inbox_dir: PathBuf,
    pub inbox_poll_interval: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_by_default: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hnsw_ef_search: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RagError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(hybrid) = overrides.hybrid_by_default {
            self.retrieval.hybrid_by_default = hybrid;
        }
        if let Some(ef) = overrides.hnsw_ef_search {
            self.retrieval.hnsw_ef_search = ef;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: NVK_RAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("NVK_RAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__PROVIDER" => {
                self.embedding.provider = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__TIMEOUT" => {
                self.embedding.timeout = value.to_string();
            }
            "RETRIEVAL__HYBRID_BY_DEFAULT" => {
                self.retrieval.hybrid_by_default =
                    value.parse().map_err(|_| RagError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as boolean", value),
                    })?;
            }
            "PERSISTENCE__ENABLED" => {
                self.persistence.enabled =
                    value.parse().map_err(|_| RagError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as boolean", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Embedding timeout, `None` when unset
    pub fn embed_timeout(&self) -> Option<Duration> {
        let raw = self.embedding.timeout.trim();
        if raw.is_empty() {
            None
        } else {
            parse_duration(raw)
        }
    }

    /// Poll interval for the inbox watcher
    pub fn inbox_poll_interval(&self) -> Duration {
        parse_duration(&self.ingest.inbox_poll_interval).unwrap_or(Duration::from_secs(2))
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("nvk-rag").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| RagError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".nvk-rag"))
    }

    /// A configuration rooted at `data_dir` using the hashing embedder,
    /// suitable for offline runs and tests.
    pub fn offline(data_dir: impl Into<PathBuf>, vector_dim: usize) -> Self {
        let data_dir = data_dir.into();
        let mut config = Self::default();
        config.ingest.inbox_dir = data_dir.join("inbox");
        config.storage.data_dir = data_dir;
        config.embedding.provider = "hashing".to_string();
        config.embedding.model = "hashing-bow".to_string();
        config.indexing.vector_dim = vector_dim;
        config
    }
}

/// Parse duration strings like "500ms", "5s", "10m", "1h" or bare seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.trim().parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    if let Some(hours) = s.strip_suffix('h') {
        return hours
            .trim()
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600));
    }
    s.parse().ok().map(Duration::from_secs)
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RagError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RagError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.nvk-rag");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: data_dir.clone(),
            },
            embedding: EmbeddingConfig {
                provider: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
                timeout: String::new(),
            },
            indexing: IndexingConfig {
                vector_dim: 384,
                metric: "l2".to_string(),
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_max_layer: 16,
                hnsw_capacity: 10_000,
                max_documents: 0,
            },
            retrieval: RetrievalConfig {
                default_limit: 5,
                hybrid_by_default: true,
                hnsw_ef_search: 64,
            },
            persistence: PersistenceConfig {
                enabled: true,
                flush_retries: 2,
            },
            ingest: IngestConfig {
                extensions: vec![".txt".to_string(), ".md".to_string()],
                stream_buffer: 1024,
                inbox_dir: data_dir.join("inbox"),
                inbox_poll_interval: "2s".to_string(),
            },
            profiles: HashMap::new(),
        }
    }
}
