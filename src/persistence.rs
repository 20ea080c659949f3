//! Chain store backends for CipherChain

use crate::blockchain::Block;
use crate::error::ChainError;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

mod journal;

pub use journal::{JournalStore, StoredBlock};

/// Abstraction for persistence backends. Every backend is append-only and
/// must support positional reads of any historical index.
pub trait Persistence: Send + Sync {
    /// Durably writes `block`. Returns only once the block would survive a
    /// crash. Rejects any index other than the next free position.
    fn persist(&self, block: &Block) -> Result<(), ChainError>;
    /// `Ok(None)` when nothing is stored at `index`.
    fn load_by_index(&self, index: u64) -> Result<Option<Block>, ChainError>;
    /// The most recently persisted block.
    fn load_head(&self) -> Result<Option<Block>, ChainError>;
    /// Number of persisted blocks.
    fn len(&self) -> Result<u64, ChainError>;

    fn is_empty(&self) -> Result<bool, ChainError> {
        Ok(self.len()? == 0)
    }
}

pub(crate) fn check_next_index(block: &Block, next: u64) -> Result<(), ChainError> {
    if block.index() != next {
        return Err(ChainError::InvalidBlock(format!(
            "Out-of-sequence append. Expected index {}, but got {}.",
            next,
            block.index()
        )));
    }
    Ok(())
}

/// SQLite-backed store holding one row per block index.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to open database: {}", e)))?;

        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to set synchronous mode: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                block_index INTEGER PRIMARY KEY,
                previous_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                payload BLOB NOT NULL,
                hash TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::StoreUnavailable(format!("Failed to create blocks table: {}", e)))?;

        tracing::debug!("Opened block database at {}", path);
        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::StoreUnavailable("Mutex poisoned".to_string()))
    }

    fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
        let index: i64 = row.get(0)?;
        let previous_hash: String = row.get(1)?;
        let timestamp: i64 = row.get(2)?;
        let payload: Vec<u8> = row.get(3)?;
        let hash: String = row.get(4)?;
        Ok(Block::from_parts(index as u64, previous_hash, timestamp as u64, payload, hash))
    }

    pub fn save_block(&self, block: &Block) -> Result<(), ChainError> {
        let conn_guard = self.lock()?;
        let tx = conn_guard
            .unchecked_transaction()
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to start transaction: {}", e)))?;

        let next: i64 = tx
            .query_row("SELECT COALESCE(MAX(block_index) + 1, 0) FROM blocks", [], |row| row.get(0))
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to read chain length: {}", e)))?;
        check_next_index(block, next as u64)?;

        tx.execute(
            "INSERT INTO blocks (block_index, previous_hash, timestamp, payload, hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.index() as i64,
                block.previous_hash(),
                block.timestamp() as i64,
                block.payload(),
                block.hash(),
            ],
        )
        .map_err(|e| ChainError::StoreUnavailable(format!("Failed to save block: {}", e)))?;

        tx.commit()
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    pub fn load_block(&self, index: u64) -> Result<Option<Block>, ChainError> {
        let conn_guard = self.lock()?;
        conn_guard
            .query_row(
                "SELECT block_index, previous_hash, timestamp, payload, hash
                 FROM blocks WHERE block_index = ?1",
                params![index as i64],
                Self::row_to_block,
            )
            .optional()
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to load block {}: {}", index, e)))
    }

    pub fn load_last_block(&self) -> Result<Option<Block>, ChainError> {
        let conn_guard = self.lock()?;
        conn_guard
            .query_row(
                "SELECT block_index, previous_hash, timestamp, payload, hash
                 FROM blocks ORDER BY block_index DESC LIMIT 1",
                [],
                Self::row_to_block,
            )
            .optional()
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to load head block: {}", e)))
    }

    pub fn block_count(&self) -> Result<u64, ChainError> {
        let conn_guard = self.lock()?;
        let count: i64 = conn_guard
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to count blocks: {}", e)))?;
        Ok(count as u64)
    }
}

impl Persistence for Database {
    fn persist(&self, block: &Block) -> Result<(), ChainError> {
        Database::save_block(self, block)
    }

    fn load_by_index(&self, index: u64) -> Result<Option<Block>, ChainError> {
        Database::load_block(self, index)
    }

    fn load_head(&self) -> Result<Option<Block>, ChainError> {
        Database::load_last_block(self)
    }

    fn len(&self) -> Result<u64, ChainError> {
        Database::block_count(self)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<Mutex<Vec<Block>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn persist(&self, block: &Block) -> Result<(), ChainError> {
        let mut blocks = self.blocks.lock().map_err(|_| ChainError::StoreUnavailable("Mutex poisoned".to_string()))?;
        check_next_index(block, blocks.len() as u64)?;
        blocks.push(block.clone());
        Ok(())
    }

    fn load_by_index(&self, index: u64) -> Result<Option<Block>, ChainError> {
        let blocks = self.blocks.lock().map_err(|_| ChainError::StoreUnavailable("Mutex poisoned".to_string()))?;
        Ok(usize::try_from(index).ok().and_then(|i| blocks.get(i)).cloned())
    }

    fn load_head(&self) -> Result<Option<Block>, ChainError> {
        let blocks = self.blocks.lock().map_err(|_| ChainError::StoreUnavailable("Mutex poisoned".to_string()))?;
        Ok(blocks.last().cloned())
    }

    fn len(&self) -> Result<u64, ChainError> {
        let blocks = self.blocks.lock().map_err(|_| ChainError::StoreUnavailable("Mutex poisoned".to_string()))?;
        Ok(blocks.len() as u64)
    }
}
