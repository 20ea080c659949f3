use crate::blockchain::core::chain::{Block, GENESIS_PREVIOUS_HASH};
use crate::error::ChainError;
use crate::persistence::Persistence;
use std::fmt;

/// Which integrity check a block failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// No block is stored at the position the walk needed.
    MissingBlock,
    /// The block stored at this position reports a different index.
    IndexMismatch { found: u64 },
    /// `previous_hash` does not match the predecessor's hash.
    LinkageMismatch { expected: String, found: String },
    /// The stored hash is not the digest of the stored fields.
    HashMismatch { stored: String, recomputed: String },
    /// Block 0 is not linked to the sentinel.
    GenesisLinkage { found: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainViolation {
    pub index: u64,
    pub kind: ViolationKind,
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ViolationKind::MissingBlock => write!(f, "block {} is missing", self.index),
            ViolationKind::IndexMismatch { found } => {
                write!(f, "position {} holds a block claiming index {}", self.index, found)
            }
            ViolationKind::LinkageMismatch { expected, found } => write!(
                f,
                "block {} links to {} but its predecessor hashes to {}",
                self.index, found, expected
            ),
            ViolationKind::HashMismatch { stored, recomputed } => write!(
                f,
                "block {} stores hash {} but its fields hash to {}",
                self.index, stored, recomputed
            ),
            ViolationKind::GenesisLinkage { found } => write!(
                f,
                "genesis block links to {} instead of {}",
                found, GENESIS_PREVIOUS_HASH
            ),
        }
    }
}

/// Outcome of a full chain walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    Valid { length: u64 },
    Invalid(ChainViolation),
}

impl ChainVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainVerdict::Valid { .. })
    }

    pub fn violation(&self) -> Option<&ChainViolation> {
        match self {
            ChainVerdict::Valid { .. } => None,
            ChainVerdict::Invalid(v) => Some(v),
        }
    }
}

fn invalid(index: u64, kind: ViolationKind) -> ChainVerdict {
    ChainVerdict::Invalid(ChainViolation { index, kind })
}

/// Checks that `block` is sealed correctly: its hash re-derives and, for
/// genesis, it points at the sentinel.
pub fn check_block(block: &Block) -> Option<ViolationKind> {
    let recomputed = block.recomputed_hash();
    if recomputed != block.hash() {
        return Some(ViolationKind::HashMismatch {
            stored: block.hash().to_string(),
            recomputed,
        });
    }
    if block.is_genesis() && block.previous_hash() != GENESIS_PREVIOUS_HASH {
        return Some(ViolationKind::GenesisLinkage {
            found: block.previous_hash().to_string(),
        });
    }
    None
}

/// Walks the stored chain from `head_index` down to genesis, re-deriving every
/// hash and checking every link against the predecessor read from `store`.
///
/// Store failures are returned as errors; integrity failures are reported in
/// the verdict.
pub fn verify_stored_chain(store: &dyn Persistence, head_index: Option<u64>) -> Result<ChainVerdict, ChainError> {
    let head_index = match head_index {
        Some(i) => i,
        None => return Ok(ChainVerdict::Valid { length: 0 }),
    };

    let mut current = match store.load_by_index(head_index)? {
        Some(block) => block,
        None => return Ok(invalid(head_index, ViolationKind::MissingBlock)),
    };
    let mut position = head_index;

    loop {
        if current.index() != position {
            return Ok(invalid(position, ViolationKind::IndexMismatch { found: current.index() }));
        }
        if let Some(kind) = check_block(&current) {
            return Ok(invalid(position, kind));
        }
        if position == 0 {
            break;
        }

        let predecessor = match store.load_by_index(position - 1)? {
            Some(block) => block,
            None => return Ok(invalid(position - 1, ViolationKind::MissingBlock)),
        };
        if current.previous_hash() != predecessor.hash() {
            return Ok(invalid(
                position,
                ViolationKind::LinkageMismatch {
                    expected: predecessor.hash().to_string(),
                    found: current.previous_hash().to_string(),
                },
            ));
        }

        current = predecessor;
        position -= 1;
    }

    Ok(ChainVerdict::Valid {
        length: head_index + 1,
    })
}
