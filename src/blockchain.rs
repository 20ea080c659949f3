// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// the block itself, the ledger, and chain verification.

pub mod core;
pub use self::core::*;
