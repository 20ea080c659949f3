//! Integration tests for ledger persistence and tamper detection
//!
//! Each scenario runs against both on-disk backends, tampers with the stored
//! representation directly and reopens the ledger, the way an attacker with
//! disk access would.

use cipherchain::blockchain::{Block, ChainVerdict, Ledger, ViolationKind, GENESIS_PREVIOUS_HASH};
use cipherchain::persistence::{Database, JournalStore, Persistence, StoredBlock};
use rusqlite::params;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Clone, Copy, Debug)]
enum Backend {
    Sqlite,
    Journal,
}

const BACKENDS: [Backend; 2] = [Backend::Sqlite, Backend::Journal];

fn store_path(dir: &TempDir, backend: Backend) -> PathBuf {
    match backend {
        Backend::Sqlite => dir.path().join("chain.db"),
        Backend::Journal => dir.path().join("chain.jsonl"),
    }
}

fn open_ledger(path: &Path, backend: Backend) -> Result<Ledger, Box<dyn std::error::Error>> {
    let store: Box<dyn Persistence> = match backend {
        Backend::Sqlite => Box::new(Database::open(path.to_str().ok_or("non-utf8 path")?)?),
        Backend::Journal => Box::new(JournalStore::open(path)?),
    };
    Ok(Ledger::open(store)?)
}

/// Rewrites the stored record at `index` through `edit`, bypassing the ledger.
fn tamper(
    path: &Path,
    backend: Backend,
    index: u64,
    edit: impl FnOnce(&mut StoredBlock),
) -> Result<(), Box<dyn std::error::Error>> {
    match backend {
        Backend::Sqlite => {
            let conn = rusqlite::Connection::open(path)?;
            let block = Database::open(path.to_str().ok_or("non-utf8 path")?)?
                .load_by_index(index)?
                .ok_or("no such block")?;
            let mut record = StoredBlock::from(&block);
            edit(&mut record);
            let tampered = record.into_block()?;
            conn.execute(
                "UPDATE blocks SET block_index = ?1, previous_hash = ?2, timestamp = ?3, payload = ?4, hash = ?5
                 WHERE block_index = ?6",
                params![
                    tampered.index() as i64,
                    tampered.previous_hash(),
                    tampered.timestamp() as i64,
                    tampered.payload(),
                    tampered.hash(),
                    index as i64,
                ],
            )?;
        }
        Backend::Journal => {
            let contents = fs::read_to_string(path)?;
            let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
            let line = lines.get_mut(index as usize).ok_or("no such line")?;
            let mut record: StoredBlock = serde_json::from_str(line)?;
            edit(&mut record);
            *line = serde_json::to_string(&record)?;
            fs::write(path, lines.join("\n") + "\n")?;
        }
    }
    Ok(())
}

fn flip_first_payload_byte(record: &mut StoredBlock) {
    let mut payload = record.clone().into_block().unwrap().into_payload();
    payload[0] ^= 0x01;
    let tampered = Block::from_parts(
        record.index,
        record.previous_hash.clone(),
        record.timestamp,
        payload,
        record.hash.clone(),
    );
    *record = StoredBlock::from(&tampered);
}

#[test]
fn test_p0_p1_p2_scenario() -> Result<(), Box<dyn std::error::Error>> {
    for backend in BACKENDS {
        let dir = TempDir::new()?;
        let path = store_path(&dir, backend);

        let ledger = open_ledger(&path, backend)?;
        let b0 = ledger.add_block(b"P0".to_vec())?;
        let b1 = ledger.add_block(b"P1".to_vec())?;
        let b2 = ledger.add_block(b"P2".to_vec())?;
        assert_eq!((b0.index(), b1.index(), b2.index()), (0, 1, 2));

        assert_eq!(ledger.get_chain()?, vec![b0, b1, b2]);
        assert!(ledger.is_valid_chain()?);
        drop(ledger);

        tamper(&path, backend, 1, flip_first_payload_byte)?;

        let reloaded = open_ledger(&path, backend)?;
        assert!(!reloaded.is_valid_chain()?, "{:?}: tampered payload went unnoticed", backend);
        let violation = reloaded.verify_chain()?.violation().cloned().ok_or("expected violation")?;
        assert_eq!(violation.index, 1);
        assert!(matches!(violation.kind, ViolationKind::HashMismatch { .. }));
    }
    Ok(())
}

#[test]
fn test_restart_recovers_head() -> Result<(), Box<dyn std::error::Error>> {
    for backend in BACKENDS {
        let dir = TempDir::new()?;
        let path = store_path(&dir, backend);

        let b0 = open_ledger(&path, backend)?.add_block(b"P0".to_vec())?;

        let ledger = open_ledger(&path, backend)?;
        assert_eq!(ledger.head().as_ref(), Some(&b0));
        let b1 = ledger.add_block(b"P1".to_vec())?;
        assert_eq!(b1.index(), 1);
        assert_eq!(b1.previous_hash(), b0.hash());
        assert!(ledger.is_valid_chain()?);
    }
    Ok(())
}

#[test]
fn test_chain_properties_hold() -> Result<(), Box<dyn std::error::Error>> {
    for backend in BACKENDS {
        let dir = TempDir::new()?;
        let ledger = open_ledger(&store_path(&dir, backend), backend)?;
        assert!(ledger.is_valid_chain()?);

        for i in 0..12u8 {
            let payload: Vec<u8> = (0..i).map(|b| b.wrapping_mul(37)).collect();
            ledger.add_block(payload)?;
        }

        let chain = ledger.get_chain()?;
        assert_eq!(chain.len(), 12);
        for (i, block) in chain.iter().enumerate() {
            assert_eq!(block.index(), i as u64);
            assert!(block.has_valid_hash());
            let expected_prev = if i == 0 {
                GENESIS_PREVIOUS_HASH
            } else {
                chain[i - 1].hash()
            };
            assert_eq!(block.previous_hash(), expected_prev);
        }
        assert_eq!(ledger.verify_chain()?, ChainVerdict::Valid { length: 12 });
    }
    Ok(())
}

#[test]
fn test_binary_payload_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    for backend in BACKENDS {
        let dir = TempDir::new()?;
        let path = store_path(&dir, backend);
        let payload: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();

        let sealed = open_ledger(&path, backend)?.add_block(payload.clone())?;

        let reloaded = open_ledger(&path, backend)?;
        let block = reloaded.get_block(0)?.ok_or("block 0 missing")?;
        assert_eq!(block.payload(), payload.as_slice());
        assert_eq!(block.hash(), sealed.hash());
    }
    Ok(())
}

#[test]
fn test_any_single_field_tamper_is_detected() -> Result<(), Box<dyn std::error::Error>> {
    let edits: [(&str, fn(&mut StoredBlock)); 4] = [
        ("index", |r| r.index += 10),
        ("previous_hash", |r| r.previous_hash.push('0')),
        ("timestamp", |r| r.timestamp += 1),
        ("payload", flip_first_payload_byte),
    ];

    for backend in BACKENDS {
        for target in 0..3u64 {
            for (field, edit) in edits {
                let dir = TempDir::new()?;
                let path = store_path(&dir, backend);
                {
                    let ledger = open_ledger(&path, backend)?;
                    for p in [b"P0", b"P1", b"P2"] {
                        ledger.add_block(p.to_vec())?;
                    }
                }

                tamper(&path, backend, target, edit)?;

                let ledger = open_ledger(&path, backend)?;
                assert!(
                    !ledger.is_valid_chain()?,
                    "{:?}: tampering {} of block {} went unnoticed",
                    backend,
                    field,
                    target
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_journal_payload_text_edit_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = store_path(&dir, Backend::Journal);
    {
        let ledger = open_ledger(&path, Backend::Journal)?;
        for p in [b"P0", b"P1", b"P2"] {
            ledger.add_block(p.to_vec())?;
        }
    }

    // Hand-edit B1's base64 text so it no longer decodes.
    let contents = fs::read_to_string(&path)?;
    let edited = contents.replacen("\"payload\":\"UDE=\"", "\"payload\":\"UDF=\"", 1);
    assert_ne!(edited, contents);
    fs::write(&path, edited)?;

    let ledger = open_ledger(&path, Backend::Journal)?;
    match ledger.is_valid_chain() {
        Err(err) => assert!(err.is_store_unavailable(), "unexpected error: {:?}", err),
        Ok(valid) => assert!(!valid, "edited payload went unnoticed"),
    }
    assert!(matches!(ledger.get_chain(), Err(err) if err.is_store_unavailable()));
    Ok(())
}
