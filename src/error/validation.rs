use crate::core::{Hash256, OutPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons a transaction is refused by validation or by the mempool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxError {
    MalformedTransaction(String),
    MissingInput { outpoint: OutPoint },
    DoubleSpendWithinTx { outpoint: OutPoint },
    InvalidSignature { input: usize },
    InsufficientInputValue { inputs: u64, outputs: u64 },
    /// The outpoint is already spent by `existing`, which stays in the pool
    MempoolConflict { outpoint: OutPoint, existing: Hash256 },
    AlreadyInPool { txid: Hash256 },
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::MalformedTransaction(msg) => write!(f, "malformed transaction: {msg}"),
            TxError::MissingInput { outpoint } => {
                write!(f, "input {outpoint} is not an unspent output")
            }
            TxError::DoubleSpendWithinTx { outpoint } => {
                write!(f, "outpoint {outpoint} is spent twice by the same transaction")
            }
            TxError::InvalidSignature { input } => {
                write!(f, "signature of input {input} does not verify")
            }
            TxError::InsufficientInputValue { inputs, outputs } => {
                write!(f, "inputs worth {inputs} cannot pay outputs worth {outputs}")
            }
            TxError::MempoolConflict { outpoint, existing } => {
                write!(f, "outpoint {outpoint} already spent by pending transaction {existing}")
            }
            TxError::AlreadyInPool { txid } => write!(f, "transaction {txid} already pending"),
        }
    }
}

impl std::error::Error for TxError {}

/// Reasons a block is refused. `OrphanBlock` is the only recoverable one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockError {
    MalformedBlock(String),
    InvalidHeader(String),
    InsufficientWork { hash: Hash256 },
    InvalidTimestamp(String),
    InvalidCoinbase(String),
    InvalidTransaction { index: usize, cause: TxError },
    DoubleSpendInBlock { outpoint: OutPoint, index: usize },
    OrphanBlock { missing_parent: Hash256 },
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::MalformedBlock(msg) => write!(f, "malformed block: {msg}"),
            BlockError::InvalidHeader(msg) => write!(f, "invalid header: {msg}"),
            BlockError::InsufficientWork { hash } => {
                write!(f, "block hash {hash} does not meet its target")
            }
            BlockError::InvalidTimestamp(msg) => write!(f, "invalid timestamp: {msg}"),
            BlockError::InvalidCoinbase(msg) => write!(f, "invalid coinbase: {msg}"),
            BlockError::InvalidTransaction { index, cause } => {
                write!(f, "transaction {index} is invalid: {cause}")
            }
            BlockError::DoubleSpendInBlock { outpoint, index } => {
                write!(f, "transaction {index} spends {outpoint} which the block already spent")
            }
            BlockError::OrphanBlock { missing_parent } => {
                write!(f, "parent block {missing_parent} is unknown")
            }
        }
    }
}

impl std::error::Error for BlockError {}
