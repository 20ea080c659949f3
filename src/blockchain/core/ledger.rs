use crate::blockchain::core::chain::{Block, GENESIS_PREVIOUS_HASH};
use crate::blockchain::core::validation::{verify_stored_chain, ChainVerdict};
use crate::error::ChainError;
use crate::persistence::Persistence;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Append-only ledger over a [`Persistence`] backend.
///
/// Appends are serialized: index assignment and the durable write happen
/// under one lock, and the in-memory head only moves after the store has
/// accepted the block. Readers take a snapshot of the head and walk the store
/// without blocking writers.
pub struct Ledger {
    persistence: Box<dyn Persistence>,
    head: RwLock<Option<Block>>,
    append_lock: Mutex<()>,
}

impl Ledger {
    /// Opens a ledger over `persistence`, recovering the head from whatever
    /// the store already holds.
    pub fn open(persistence: Box<dyn Persistence>) -> Result<Self, ChainError> {
        let head = persistence.load_head()?;
        match &head {
            Some(block) => info!("Ledger opened at height {} (head {})", block.index(), block.hash()),
            None => info!("Ledger opened on an empty chain"),
        }

        Ok(Ledger {
            persistence,
            head: RwLock::new(head),
            append_lock: Mutex::new(()),
        })
    }

    /// Seals `payload` into a new block at the tail and persists it.
    pub fn add_block(&self, payload: Vec<u8>) -> Result<Block, ChainError> {
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.add_block_at(payload, timestamp)
    }

    /// Like [`Ledger::add_block`] with a caller-supplied timestamp in
    /// milliseconds since the Unix epoch.
    pub fn add_block_at(&self, payload: Vec<u8>, timestamp: u64) -> Result<Block, ChainError> {
        let _append = self.append_lock.lock();

        let block = match self.head.read().as_ref() {
            Some(head) => Block::new(head.index() + 1, head.hash(), timestamp, payload),
            None => Block::new(0, GENESIS_PREVIOUS_HASH, timestamp, payload),
        };

        if let Err(e) = self.persistence.persist(&block) {
            warn!("Failed to persist block {}: {}", block.index(), e);
            return Err(e);
        }

        *self.head.write() = Some(block.clone());
        debug!(
            "Appended block {} ({} payload bytes, hash {})",
            block.index(),
            block.payload().len(),
            block.hash()
        );
        Ok(block)
    }

    /// Re-derives every stored hash and link from the head down to genesis.
    pub fn verify_chain(&self) -> Result<ChainVerdict, ChainError> {
        let head_index = self.head.read().as_ref().map(Block::index);
        let verdict = verify_stored_chain(self.persistence.as_ref(), head_index)?;
        if let ChainVerdict::Invalid(violation) = &verdict {
            warn!("Chain verification failed: {}", violation);
        }
        Ok(verdict)
    }

    pub fn is_valid_chain(&self) -> Result<bool, ChainError> {
        Ok(self.verify_chain()?.is_valid())
    }

    /// Materializes the whole chain, oldest block first.
    ///
    /// A gap below the head is reported as [`ChainError::BlockNotFound`].
    pub fn get_chain(&self) -> Result<Vec<Block>, ChainError> {
        let head_index = match self.head.read().as_ref() {
            Some(head) => head.index(),
            None => return Ok(Vec::new()),
        };

        let mut chain = Vec::with_capacity(head_index as usize + 1);
        for index in (0..=head_index).rev() {
            let block = self
                .persistence
                .load_by_index(index)?
                .ok_or(ChainError::BlockNotFound(index))?;
            chain.push(block);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Reads a single block from the store.
    pub fn get_block(&self, index: u64) -> Result<Option<Block>, ChainError> {
        self.persistence.load_by_index(index)
    }

    pub fn head(&self) -> Option<Block> {
        self.head.read().clone()
    }

    /// Number of blocks up to and including the head.
    pub fn height(&self) -> u64 {
        self.head.read().as_ref().map_or(0, |b| b.index() + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.head.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Database, InMemoryPersistence};
    use std::sync::Arc;

    struct FailingStore;

    impl Persistence for FailingStore {
        fn persist(&self, _block: &Block) -> Result<(), ChainError> {
            Err(ChainError::StoreUnavailable("disk on fire".to_string()))
        }
        fn load_by_index(&self, _index: u64) -> Result<Option<Block>, ChainError> {
            Ok(None)
        }
        fn load_head(&self) -> Result<Option<Block>, ChainError> {
            Ok(None)
        }
        fn len(&self) -> Result<u64, ChainError> {
            Ok(0)
        }
    }

    #[test]
    fn test_first_block_is_genesis() {
        let ledger = Ledger::open(Box::new(InMemoryPersistence::new())).unwrap();
        assert!(ledger.is_empty());

        let block = ledger.add_block(b"P0".to_vec()).unwrap();
        assert_eq!(block.index(), 0);
        assert_eq!(block.previous_hash(), GENESIS_PREVIOUS_HASH);
        assert_eq!(ledger.head(), Some(block));
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn test_blocks_link_to_predecessor() {
        let ledger = Ledger::open(Box::new(InMemoryPersistence::new())).unwrap();
        let b0 = ledger.add_block(b"P0".to_vec()).unwrap();
        let b1 = ledger.add_block(b"P1".to_vec()).unwrap();
        let b2 = ledger.add_block(Vec::new()).unwrap();

        assert_eq!(b1.index(), 1);
        assert_eq!(b1.previous_hash(), b0.hash());
        assert_eq!(b2.previous_hash(), b1.hash());
        assert_eq!(ledger.get_chain().unwrap(), vec![b0, b1, b2]);
        assert!(ledger.is_valid_chain().unwrap());
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = Ledger::open(Box::new(InMemoryPersistence::new())).unwrap();
        assert!(ledger.get_chain().unwrap().is_empty());
        assert!(ledger.is_valid_chain().unwrap());
        assert_eq!(ledger.verify_chain().unwrap(), ChainVerdict::Valid { length: 0 });
    }

    #[test]
    fn test_failed_persist_keeps_head() {
        let ledger = Ledger::open(Box::new(FailingStore)).unwrap();
        let err = ledger.add_block(b"lost".to_vec()).unwrap_err();
        assert!(err.is_store_unavailable());
        assert!(ledger.head().is_none());
    }

    #[test]
    fn test_head_recovered_from_store() {
        let store = InMemoryPersistence::new();
        {
            let ledger = Ledger::open(Box::new(store.clone())).unwrap();
            ledger.add_block(b"P0".to_vec()).unwrap();
        }
        let ledger = Ledger::open(Box::new(store)).unwrap();
        let b1 = ledger.add_block(b"P1".to_vec()).unwrap();
        assert_eq!(b1.index(), 1);
    }

    #[test]
    fn test_get_chain_reports_gap() {
        let store = InMemoryPersistence::new();
        let ledger = Ledger::open(Box::new(store.clone())).unwrap();
        for i in 0..3u8 {
            ledger.add_block(vec![i]).unwrap();
        }
        store.blocks.lock().unwrap().truncate(1);

        assert_eq!(ledger.get_chain().unwrap_err(), ChainError::BlockNotFound(2));
        assert!(!ledger.is_valid_chain().unwrap());
    }

    #[test]
    fn test_explicit_timestamp() {
        let ledger = Ledger::open(Box::new(Database::open(":memory:").unwrap())).unwrap();
        let block = ledger.add_block_at(vec![1, 2, 3], 1_672_531_200_000).unwrap();
        assert_eq!(block.timestamp(), 1_672_531_200_000);
        assert_eq!(ledger.get_block(0).unwrap(), Some(block));
        assert!(ledger.get_block(1).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_appends_get_unique_indices() {
        let ledger = Arc::new(Ledger::open(Box::new(InMemoryPersistence::new())).unwrap());
        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    (0..25u8)
                        .map(|i| ledger.add_block(vec![t, i]).unwrap().index())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut indices: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..200).collect::<Vec<u64>>());
        assert_eq!(ledger.height(), 200);
        assert!(ledger.is_valid_chain().unwrap());
    }
}
