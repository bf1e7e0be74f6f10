//! Ledger state and persistence
//!
//! The UTXO set, the mempool of pending transactions and the durable block
//! store behind the chain manager.

pub mod memory_pool;
pub mod store;
pub mod utxo_set;

pub use memory_pool::MemoryPool;
pub use store::{ChainStore, MemoryStore, SledStore, UtxoSnapshot};
pub use utxo_set::{BlockUndo, UTXOSet, UtxoOverlay, UtxoView};
