#![deny(missing_docs)]
#![deny(clippy::all)]
//! Replicated KV store on top of two-phase commit.

/// Replica storage on RocksDB.
pub mod rocks;

/// KV store client.
pub mod client;

pub use client::Client;
pub use rocks::RocksStore;
