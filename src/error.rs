//! Error types for CipherChain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The persistence medium could not be read or written.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// A position that had to exist is missing from the store.
    #[error("Block not found at index {0}")]
    BlockNotFound(u64),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl ChainError {
    /// True for failures of the storage layer itself, as opposed to ledger
    /// outcomes such as a missing block.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, ChainError::StoreUnavailable(_))
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::StoreUnavailable(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_not_store_errors() {
        let err: ChainError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ChainError::IoError(_)));
        assert!(!err.is_store_unavailable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ChainError::BlockNotFound(7).to_string(),
            "Block not found at index 7"
        );
        assert_eq!(
            ChainError::StoreUnavailable("disk full".into()).to_string(),
            "Store unavailable: disk full"
        );
    }
}
