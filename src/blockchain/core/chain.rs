use sha2::{Digest, Sha256};

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A sealed ledger entry.
///
/// The hash binds `index`, `previous_hash`, `timestamp` and `payload`
/// together. Fields are only reachable through accessors so a block built by
/// [`Block::new`] can never drift from its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: u64,
    previous_hash: String,
    timestamp: u64,
    payload: Vec<u8>,
    hash: String,
}

impl Block {
    pub fn new(index: u64, previous_hash: impl Into<String>, timestamp: u64, payload: Vec<u8>) -> Self {
        let previous_hash = previous_hash.into();
        let hash = Self::calculate_hash(index, &previous_hash, timestamp, &payload);

        Block {
            index,
            previous_hash,
            timestamp,
            payload,
            hash,
        }
    }

    /// Builds the block at index 0, linked to the sentinel.
    pub fn genesis(timestamp: u64, payload: Vec<u8>) -> Self {
        Self::new(0, GENESIS_PREVIOUS_HASH, timestamp, payload)
    }

    /// Reassembles a block read back from storage. The hash is taken as
    /// stored and is not checked here; see [`Block::has_valid_hash`].
    pub fn from_parts(
        index: u64,
        previous_hash: String,
        timestamp: u64,
        payload: Vec<u8>,
        hash: String,
    ) -> Self {
        Block {
            index,
            previous_hash,
            timestamp,
            payload,
            hash,
        }
    }

    /// SHA-256 over `index ‖ previous_hash ‖ timestamp ‖ hex(payload)`, with
    /// both integers rendered in decimal. Returned as lowercase hex.
    ///
    /// The concatenation order is part of the persisted format.
    pub fn calculate_hash(index: u64, previous_hash: &str, timestamp: u64, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(index.to_string().as_bytes());
        hasher.update(previous_hash.as_bytes());
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(hex::encode(payload).as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn recomputed_hash(&self) -> String {
        Self::calculate_hash(self.index, &self.previous_hash, self.timestamp, &self.payload)
    }

    pub fn has_valid_hash(&self) -> bool {
        self.recomputed_hash() == self.hash
    }
}
