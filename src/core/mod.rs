//! Core ledger functionality
//!
//! Hashes, transactions and blocks, proof-of-work and retargeting, the
//! consensus checks, and the chain manager that ties them together.

pub mod block;
pub mod blockchain;
pub mod chain_state;
pub mod difficulty;
pub mod hash;
pub mod merkle;
pub mod miner;
pub mod monetary;
pub mod orphan_pool;
pub mod proof_of_work;
pub mod transaction;
pub mod validation;

pub use block::{Block, BlockHeader};
pub use blockchain::{
    BlockLocator, BlockStatus, Blockchain, ChainUpdate, ProcessOutcome, TipInfo,
    DEFAULT_SNAPSHOT_INTERVAL,
};
pub use chain_state::{ChainState, SharedChainState};
pub use difficulty::DifficultyAdjustment;
pub use hash::Hash256;
pub use merkle::MerkleTree;
pub use miner::Miner;
pub use monetary::{block_reward, INITIAL_BLOCK_REWARD, MAX_MONEY};
pub use proof_of_work::ProofOfWork;
pub use transaction::{OutPoint, TXInput, TXOutput, Transaction};
pub use validation::{validate_block, validate_transaction, ParentState, ValidatedBlock, ValidatedTx};
