//! Append-only JSON-lines journal.
//!
//! One record per line, payload in base64. A line is durable once its
//! trailing newline has been synced; bytes after the last newline are a torn
//! write and are cut off when the journal is opened. A terminated line that
//! does not parse is corruption and the journal refuses to open.

use super::{check_next_index, Persistence};
use crate::blockchain::Block;
use crate::error::ChainError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// On-disk form of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: u64,
    /// Standard base64.
    pub payload: String,
    pub hash: String,
}

impl From<&Block> for StoredBlock {
    fn from(block: &Block) -> Self {
        StoredBlock {
            index: block.index(),
            previous_hash: block.previous_hash().to_string(),
            timestamp: block.timestamp(),
            payload: BASE64.encode(block.payload()),
            hash: block.hash().to_string(),
        }
    }
}

impl StoredBlock {
    pub fn into_block(self) -> Result<Block, ChainError> {
        let payload = BASE64.decode(self.payload.as_bytes()).map_err(|e| {
            ChainError::InvalidBlock(format!("Block {} has a malformed payload: {}", self.index, e))
        })?;
        Ok(Block::from_parts(
            self.index,
            self.previous_hash,
            self.timestamp,
            payload,
            self.hash,
        ))
    }
}

struct Extent {
    start: u64,
    len: u64,
}

struct JournalInner {
    file: File,
    records: Vec<Extent>,
    end: u64,
}

pub struct JournalStore {
    path: PathBuf,
    inner: Mutex<JournalInner>,
}

impl JournalStore {
    /// Opens or creates the journal at `path`, discarding a torn trailing
    /// record if the previous writer crashed mid-append.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ChainError::StoreUnavailable(format!("Failed to create journal dir {:?}: {}", parent, e))
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to open journal {:?}: {}", path, e)))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to read journal: {}", e)))?;

        let (records, end) = scan_records(&bytes)?;
        if end < bytes.len() as u64 {
            warn!(
                "Discarding {} bytes of incomplete trailing record in {:?}",
                bytes.len() as u64 - end,
                path
            );
            file.set_len(end)
                .and_then(|_| file.sync_all())
                .map_err(|e| ChainError::StoreUnavailable(format!("Failed to truncate torn record: {}", e)))?;
        }

        debug!("Opened journal {:?} with {} blocks", path, records.len());
        Ok(JournalStore {
            path,
            inner: Mutex::new(JournalInner { file, records, end }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, JournalInner>, ChainError> {
        self.inner
            .lock()
            .map_err(|_| ChainError::StoreUnavailable("Mutex poisoned".to_string()))
    }

    fn read_record(inner: &mut JournalInner, position: usize) -> Result<Option<Block>, ChainError> {
        let (start, len) = match inner.records.get(position) {
            Some(extent) => (extent.start, extent.len),
            None => return Ok(None),
        };

        let line = read_at(&mut inner.file, start, len)
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to read block {}: {}", position, e)))?;

        let record: StoredBlock = serde_json::from_slice(&line).map_err(|e| {
            ChainError::StoreUnavailable(format!("Journal record {} is corrupt: {}", position, e))
        })?;
        record.into_block().map(Some).map_err(|e| {
            ChainError::StoreUnavailable(format!("Journal record {} is corrupt: {}", position, e))
        })
    }
}

fn read_at(file: &mut File, start: u64, len: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_at(file: &mut File, start: u64, bytes: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(start))?;
    file.write_all(bytes)?;
    file.sync_data()
}

/// Splits the journal into complete records. Returns their extents and the
/// offset just past the last good one.
fn scan_records(bytes: &[u8]) -> Result<(Vec<Extent>, u64), ChainError> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let newline = match bytes[pos..].iter().position(|b| *b == b'\n') {
            Some(offset) => pos + offset,
            None => break,
        };
        let line = &bytes[pos..newline];

        // A newline-terminated line was fully written; if it no longer parses
        // it was altered, not torn.
        if serde_json::from_slice::<StoredBlock>(line).is_err() {
            return Err(ChainError::StoreUnavailable(format!(
                "Journal record {} at byte {} is corrupt",
                records.len(),
                pos
            )));
        }

        records.push(Extent {
            start: pos as u64,
            len: line.len() as u64,
        });
        pos = newline + 1;
    }

    Ok((records, pos as u64))
}

impl Persistence for JournalStore {
    fn persist(&self, block: &Block) -> Result<(), ChainError> {
        let mut inner = self.lock()?;
        check_next_index(block, inner.records.len() as u64)?;

        let mut line = serde_json::to_vec(&StoredBlock::from(block))
            .map_err(|e| ChainError::StoreUnavailable(format!("Failed to serialize block: {}", e)))?;
        let record_len = line.len() as u64;
        line.push(b'\n');

        let start = inner.end;
        if let Err(e) = write_at(&mut inner.file, start, &line) {
            if let Err(rollback) = inner.file.set_len(start) {
                warn!("Failed to roll back partial append at byte {}: {}", start, rollback);
            }
            return Err(ChainError::StoreUnavailable(format!(
                "Failed to append block {}: {}",
                block.index(),
                e
            )));
        }

        inner.records.push(Extent {
            start,
            len: record_len,
        });
        inner.end = start + line.len() as u64;
        Ok(())
    }

    fn load_by_index(&self, index: u64) -> Result<Option<Block>, ChainError> {
        let position = match usize::try_from(index) {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };
        let mut inner = self.lock()?;
        Self::read_record(&mut inner, position)
    }

    fn load_head(&self) -> Result<Option<Block>, ChainError> {
        let mut inner = self.lock()?;
        match inner.records.len().checked_sub(1) {
            Some(last) => Self::read_record(&mut inner, last),
            None => Ok(None),
        }
    }

    fn len(&self) -> Result<u64, ChainError> {
        Ok(self.lock()?.records.len() as u64)
    }
}
