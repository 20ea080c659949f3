//! Shared helpers for the command-line front end

use crate::blockchain::Ledger;
use crate::config::{load_config, Config, StorageBackend, StorageConfig};
use crate::error::ChainError;
use crate::persistence::{Database, InMemoryPersistence, JournalStore, Persistence};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

/// Opens the chain store described by `storage`.
pub fn open_persistence(storage: &StorageConfig) -> Result<Box<dyn Persistence>, ChainError> {
    match storage.backend {
        StorageBackend::Sqlite => {
            if let Some(parent) = Path::new(&storage.path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|e| {
                        ChainError::StoreUnavailable(format!("Failed to create data dir {:?}: {}", parent, e))
                    })?;
                }
            }
            Ok(Box::new(Database::open(&storage.path)?))
        }
        StorageBackend::Journal => Ok(Box::new(JournalStore::open(&storage.path)?)),
        StorageBackend::Memory => Ok(Box::new(InMemoryPersistence::new())),
    }
}

pub fn load_ledger_from_config(config_path: &Path) -> Result<(Config, Ledger), ChainError> {
    let config = load_config(config_path)?;
    let ledger = Ledger::open(open_persistence(&config.storage)?)?;
    Ok((config, ledger))
}

/// Renders a millisecond timestamp as UTC wall-clock time.
pub fn format_timestamp(millis: u64) -> String {
    match i64::try_from(millis).ok().and_then(DateTime::<Utc>::from_timestamp_millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => "Invalid".to_string(),
    }
}

/// First and last eight characters of a long hash.
pub fn short_hash(hash: &str) -> String {
    if hash.len() > 20 && hash.is_ascii() {
        format!("{}...{}", &hash[..8], &hash[hash.len() - 8..])
    } else {
        hash.to_string()
    }
}
