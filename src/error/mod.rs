//! Error handling for the ledger
//!
//! `BlockchainError` is the crate-wide error. Consensus rejections are carried
//! as structured `TxError`/`BlockError` values so callers (and peers) can see
//! exactly why something was refused.

mod validation;

pub use validation::{BlockError, TxError};

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// A transaction was rejected by validation or the mempool
    Transaction(TxError),
    /// A block was rejected by validation or the chain manager
    Block(BlockError),
    /// A peer did not answer in time or refused the connection
    PeerUnavailable(String),
    /// Protocol level problems (bad framing, unexpected response)
    Network(String),
    Database(String),
    Crypto(String),
    Config(String),
    Serialization(String),
    Io(String),
    InvalidAddress(String),
    /// Not enough spendable value to build a payment
    InsufficientFunds { required: u64, available: u64 },
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Transaction(err) => write!(f, "Transaction rejected: {err}"),
            BlockchainError::Block(err) => write!(f, "Block rejected: {err}"),
            BlockchainError::PeerUnavailable(msg) => write!(f, "Peer unavailable: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<TxError> for BlockchainError {
    fn from(err: TxError) -> Self {
        BlockchainError::Transaction(err)
    }
}

impl From<BlockError> for BlockchainError {
    fn from(err: BlockError) -> Self {
        BlockchainError::Block(err)
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
