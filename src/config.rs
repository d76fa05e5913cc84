use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::semantic::{DEFAULT_BASE_SIMILARITY, DEFAULT_CHUNK_SIZE, DEFAULT_LIMIT, DEFAULT_MODEL};

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Default address the HTTP server binds to
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Embedding model settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Load the model at startup instead of on the first request
    #[serde(default)]
    pub preload: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            preload: false,
        }
    }
}

/// Defaults applied to search requests that omit them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Inclusive similarity floor [-1.0, 1.0]
    #[serde(default = "default_base_similarity")]
    pub default_base_similarity: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            default_base_similarity: DEFAULT_BASE_SIMILARITY,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Words per chunk when a store request omits it
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_base_similarity() -> f32 {
    DEFAULT_BASE_SIMILARITY
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model must not be empty".into()));
        }

        if self.embedding.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding.download_timeout_secs must be greater than 0".into(),
            ));
        }

        let floor = self.search.default_base_similarity;
        if !floor.is_finite() || !(-1.0..=1.0).contains(&floor) {
            return Err(ConfigError::Invalid(format!(
                "search.default_base_similarity must be between -1.0 and 1.0, got {floor}"
            )));
        }

        if self.store.default_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "store.default_chunk_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults when
    /// missing.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            write_atomic(&path, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = std::fs::read_to_string(&path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            log::info!("Upgrading {}", path.display());
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        write_atomic(&self.base_path.join(CONFIG_FILE), config_str.as_bytes())?;
        Ok(())
    }

    /// Directory holding config, models and session data.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("yaml.tmp");
    std::fs::write(&temp_path, data)?;
    std::fs::rename(&temp_path, path)
}
