//! CipherChain - A tamper-evident, hash-linked ledger of encrypted images
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Sealed blocks, the append-only ledger and chain verification
//! - [`persistence`] - Chain stores (SQLite, append-only journal, in-memory)
//!
//! ## Payloads
//! - [`crypto`] - Payload producers (AES-256-GCM image encryption)
//! - [`sources`] - Source image discovery
//! - [`ingest`] - Bounded batch ingestion with per-source outcomes
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod persistence;

// ============================================================================
// Payloads
// ============================================================================
pub mod crypto;
pub mod ingest;
pub mod sources;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;

pub use blockchain::{Block, ChainVerdict, Ledger};
pub use error::{ChainError, Result};
