//! Configuration management for CipherChain

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Journal,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoConfig {
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            workers: default_workers(),
            extensions: default_extensions(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_storage_path() -> String {
    "./data/cipherchain.db".to_string()
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("./images")
}

fn default_workers() -> usize {
    4
}

fn default_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_key_file() -> PathBuf {
    PathBuf::from("./data/image.key")
}

impl Config {
    pub fn from_toml_str(config_str: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| ChainError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate critical values
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.storage.backend != StorageBackend::Memory && self.storage.path.trim().is_empty() {
            return Err(ChainError::ConfigError("storage.path must be set in config.toml".into()));
        }
        if self.ingest.workers == 0 {
            return Err(ChainError::ConfigError("ingest.workers must be at least 1".into()));
        }
        if self.crypto.key_file.as_os_str().is_empty() {
            return Err(ChainError::ConfigError("crypto.key_file must be set in config.toml".into()));
        }
        Ok(())
    }
}

/// Loads `path`, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<Config, ChainError> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let config_str = fs::read_to_string(path)
        .map_err(|e| ChainError::ConfigError(format!("Failed to read {:?}: {}", path, e)))?;
    Config::from_toml_str(&config_str)
}
