//! Tamper-evident audit chain
//!
//! Append-only, hash-linked block log. Each block's SHA-256 hash covers every
//! field except the hash itself; verification walks the chain recomputing
//! hashes and checking linkage.

mod block;
mod chain;

pub use block::{canonical_json, AuditBlock, BlockData, GENESIS_HASH};
pub use chain::{AuditChain, SharedChain};
