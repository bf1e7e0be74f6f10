//! # powledger
//!
//! A small proof-of-work ledger: UTXO transactions signed with ECDSA P-256,
//! blocks chained by double SHA-256, most-work fork choice with
//! reorganization, a mempool, and a JSON-over-TCP protocol for keeping nodes
//! in step.
//!
//! ## Layout
//! - `core/`: hashes, transactions, blocks, proof of work, difficulty,
//!   validation and the chain manager
//! - `storage/`: the UTXO set, the mempool and the block store
//! - `network/`: wire protocol, request handling, TCP server and peer sync
//! - `wallet/`: key pairs, addresses and signing
//! - `config/`: consensus parameters and node settings
//! - `utils/`: crypto primitives and bincode helpers
//! - `cli/`: command-line parsing for the node binary
//!
//! Blocks enter through [`Blockchain::process_block`] whether they were mined
//! locally, relayed by a peer or replayed from disk. The chain with the most
//! accumulated work wins; ties keep the branch seen first.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{ConsensusParams, NodeConfig};
pub use core::{
    block_reward, validate_block, validate_transaction, Block, BlockHeader, BlockLocator,
    BlockStatus, Blockchain, ChainState, ChainUpdate, DifficultyAdjustment, Hash256, MerkleTree,
    Miner, OutPoint, ProcessOutcome, ProofOfWork, SharedChainState, TXInput, TXOutput, TipInfo,
    Transaction,
};
pub use error::{BlockError, BlockchainError, Result, TxError};
pub use network::{
    send_payment, MempoolEntry, PeerManager, PeerTransport, Request, RequestHandler, Response,
    Server, SyncCommand, Synchronizer, TcpTransport,
};
pub use storage::{ChainStore, MemoryPool, MemoryStore, SledStore, UTXOSet};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
