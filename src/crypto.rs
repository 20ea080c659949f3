//! Payload producers for CipherChain
//!
//! The ledger only stores opaque bytes. This module turns source files into
//! those bytes, by default by sealing them with AES-256-GCM.

use crate::error::ChainError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use std::fs;
use std::path::Path;

/// Length in bytes of an AES-256 key.
pub const KEY_SIZE: usize = 32;
/// Length in bytes of the GCM nonce prepended to every sealed payload.
pub const NONCE_SIZE: usize = 12;

/// Anything that can turn a source into a payload for the ledger.
pub trait PayloadProducer: Send + Sync {
    fn produce(&self, source: &Path) -> Result<Vec<u8>, ChainError>;
}

impl<F> PayloadProducer for F
where
    F: Fn(&Path) -> Result<Vec<u8>, ChainError> + Send + Sync,
{
    fn produce(&self, source: &Path) -> Result<Vec<u8>, ChainError> {
        self(source)
    }
}

/// Stores file contents unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFileProducer;

impl PayloadProducer for RawFileProducer {
    fn produce(&self, source: &Path) -> Result<Vec<u8>, ChainError> {
        read_source(source)
    }
}

fn read_source(source: &Path) -> Result<Vec<u8>, ChainError> {
    fs::read(source).map_err(|e| ChainError::IoError(format!("Failed to read {:?}: {}", source, e)))
}

/// Encrypts images with a single AES-256-GCM key.
///
/// Sealed layout: `nonce (12 bytes) ‖ ciphertext ‖ tag (16 bytes)`.
#[derive(Clone)]
pub struct ImageEncryptor {
    key: Key<Aes256Gcm>,
}

impl std::fmt::Debug for ImageEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEncryptor").finish_non_exhaustive()
    }
}

impl ImageEncryptor {
    /// Generates a fresh random key using the OS random number generator.
    pub fn generate() -> Self {
        ImageEncryptor {
            key: Aes256Gcm::generate_key(OsRng),
        }
    }

    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        if bytes.len() != KEY_SIZE {
            return Err(ChainError::CryptoError(format!(
                "Key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        Ok(ImageEncryptor {
            key: *Key::<Aes256Gcm>::from_slice(bytes),
        })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| ChainError::CryptoError(format!("Invalid hex key: {}", e)))?;
        Self::from_key_bytes(&bytes)
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.key.as_slice())
    }

    /// Reads an existing hex key from `key_file`. Never creates one.
    pub fn load(key_file: &Path) -> Result<Self, ChainError> {
        let contents = fs::read_to_string(key_file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ChainError::CryptoError(format!("Image key file {:?} does not exist", key_file))
            }
            _ => ChainError::IoError(format!("Failed to read key file {:?}: {}", key_file, e)),
        })?;
        Self::from_hex(&contents)
    }

    /// Reads a hex key from `key_file`, or generates one and writes it there
    /// when the file does not exist yet.
    pub fn load_or_generate(key_file: &Path) -> Result<Self, ChainError> {
        if key_file.exists() {
            return Self::load(key_file);
        }

        let encryptor = Self::generate();
        if let Some(parent) = key_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(key_file, encryptor.key_hex() + "\n")
            .map_err(|e| ChainError::IoError(format!("Failed to write key file {:?}: {}", key_file, e)))?;
        tracing::info!("Generated new image key at {:?}", key_file);
        Ok(encryptor)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ChainError> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| ChainError::CryptoError(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, ChainError> {
        if sealed.len() < NONCE_SIZE {
            return Err(ChainError::CryptoError(format!(
                "Sealed payload too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ChainError::CryptoError("Decryption failed: authentication tag mismatch".to_string()))
    }
}

impl PayloadProducer for ImageEncryptor {
    fn produce(&self, source: &Path) -> Result<Vec<u8>, ChainError> {
        let image = read_source(source)?;
        self.encrypt(&image)
    }
}
