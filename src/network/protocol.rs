use crate::core::{Block, BlockLocator, Hash256, OutPoint, ProcessOutcome, TXOutput, TipInfo, Transaction};
use crate::error::{BlockError, BlockchainError, Result, TxError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::io::{Read, Write};

/// Largest message a node will read off one connection
pub const MAX_MESSAGE_SIZE: u64 = 32 * 1024 * 1024;

/// Calls a peer can make. Every connection carries exactly one request and
/// one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    GetTip,
    GetBlocks {
        from: BlockLocator,
    },
    GetBlock {
        hash: Hash256,
    },
    SubmitTransaction {
        transaction: Transaction,
    },
    SubmitBlock {
        block: Block,
        /// Where the sender listens, so a resulting orphan can be resolved
        /// by asking it for the missing ancestors
        addr_from: Option<String>,
    },
    GetMempool,
    /// Confirmed outputs locked to `pub_key_hash` that no pending
    /// transaction spends yet
    GetUtxos {
        pub_key_hash: Vec<u8>,
    },
}

/// A pending transaction and the fee it pays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolEntry {
    pub transaction: Transaction,
    pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Tip(TipInfo),
    Blocks(Vec<Block>),
    Block(Option<Block>),
    TransactionAccepted { txid: Hash256 },
    TransactionRejected(TxError),
    BlockAccepted { hash: Hash256, outcome: ProcessOutcome },
    BlockRejected(BlockError),
    Mempool(Vec<MempoolEntry>),
    Utxos(Vec<(OutPoint, TXOutput)>),
    Error(String),
}

impl Response {
    /// Short name for logs, without dumping whole blocks
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Tip(_) => "Tip",
            Response::Blocks(_) => "Blocks",
            Response::Block(_) => "Block",
            Response::TransactionAccepted { .. } => "TransactionAccepted",
            Response::TransactionRejected(_) => "TransactionRejected",
            Response::BlockAccepted { .. } => "BlockAccepted",
            Response::BlockRejected(_) => "BlockRejected",
            Response::Mempool(_) => "Mempool",
            Response::Utxos(_) => "Utxos",
            Response::Error(_) => "Error",
        }
    }
}

pub fn write_message<T: Serialize, W: Write>(writer: W, message: &T) -> Result<()> {
    serde_json::to_writer(writer, message)
        .map_err(|e| BlockchainError::Network(format!("Failed to send message: {e}")))
}

/// Reads one JSON value, refusing to read more than `MAX_MESSAGE_SIZE`
pub fn read_message<T: DeserializeOwned, R: Read>(reader: R) -> Result<T> {
    let mut messages = Deserializer::from_reader(reader.take(MAX_MESSAGE_SIZE)).into_iter::<T>();
    match messages.next() {
        Some(Ok(message)) => Ok(message),
        Some(Err(e)) => Err(BlockchainError::Network(format!(
            "Failed to decode message: {e}"
        ))),
        None => Err(BlockchainError::Network(
            "Connection closed before a message arrived".to_string(),
        )),
    }
}
