use crate::config::ConsensusParams;
use crate::core::{Hash256, MerkleTree, Transaction};
use crate::error::Result;
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Text committed in the genesis coinbase
const GENESIS_TAG: &[u8] = b"powledger genesis";

/// Everything the proof-of-work commits to. The block hash is the double
/// SHA-256 of these fields laid out big-endian, nonce last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockHeader {
    pub height: u64,
    pub pre_block_hash: Hash256,
    pub merkle_root: Hash256,
    /// Milliseconds since the unix epoch
    pub timestamp: i64,
    /// Largest acceptable hash, as a big-endian 256-bit number
    pub target: Hash256,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash256 {
        Hash256::digest(&self.prepare_data())
    }

    fn prepare_data(&self) -> Vec<u8> {
        let mut data_bytes = Vec::with_capacity(120);
        data_bytes.extend(self.height.to_be_bytes());
        data_bytes.extend(self.pre_block_hash.as_bytes());
        data_bytes.extend(self.merkle_root.as_bytes());
        data_bytes.extend(self.timestamp.to_be_bytes());
        data_bytes.extend(self.target.as_bytes());
        data_bytes.extend(self.nonce.to_be_bytes());
        data_bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Block {
        Block {
            header,
            transactions,
        }
    }

    /// Unsolved block (nonce 0) with the merkle root filled in
    pub fn assemble(
        height: u64,
        pre_block_hash: Hash256,
        timestamp: i64,
        target: Hash256,
        transactions: Vec<Transaction>,
    ) -> Block {
        let header = BlockHeader {
            height,
            pre_block_hash,
            merkle_root: MerkleTree::from_transactions(&transactions),
            timestamp,
            target,
            nonce: 0,
        };
        Block::new(header, transactions)
    }

    /// The fixed first block. Every node derives the same one from the
    /// consensus parameters, so it is never mined or sent over the wire.
    pub fn genesis(params: &ConsensusParams) -> Block {
        let coinbase = Transaction::new_coinbase(0, vec![], GENESIS_TAG);
        Block::assemble(
            0,
            Hash256::zero(),
            params.genesis_timestamp,
            params.pow_limit,
            vec![coinbase],
        )
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn get_header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_height(&self) -> u64 {
        self.header.height
    }

    pub fn get_pre_block_hash(&self) -> Hash256 {
        self.header.pre_block_hash
    }

    pub fn get_timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn get_target(&self) -> Hash256 {
        self.header.target
    }

    pub fn get_nonce(&self) -> u64 {
        self.header.nonce
    }

    pub fn get_merkle_root(&self) -> Hash256 {
        self.header.merkle_root
    }

    pub fn calculate_merkle_root(&self) -> Hash256 {
        MerkleTree::from_transactions(&self.transactions)
    }

    pub fn verify_merkle_root(&self) -> bool {
        self.calculate_merkle_root() == self.header.merkle_root
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }
}
