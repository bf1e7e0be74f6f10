use crate::core::{Block, Blockchain, ChainUpdate, Hash256, TipInfo, Transaction};
use crate::error::{BlockchainError, Result, TxError};
use crate::storage::MemoryPool;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The chain and its mempool, mutated together so readers never see one
/// updated without the other
pub struct ChainState {
    blockchain: Blockchain,
    mempool: MemoryPool,
}

/// What the server, miner and sync threads share
pub type SharedChainState = Arc<RwLock<ChainState>>;

pub fn read_state(state: &SharedChainState) -> Result<RwLockReadGuard<'_, ChainState>> {
    state
        .read()
        .map_err(|e| BlockchainError::Database(format!("Chain state lock poisoned: {e}")))
}

pub fn write_state(state: &SharedChainState) -> Result<RwLockWriteGuard<'_, ChainState>> {
    state
        .write()
        .map_err(|e| BlockchainError::Database(format!("Chain state lock poisoned: {e}")))
}

impl ChainState {
    pub fn new(blockchain: Blockchain) -> ChainState {
        ChainState {
            blockchain,
            mempool: MemoryPool::new(),
        }
    }

    pub fn into_shared(self) -> SharedChainState {
        Arc::new(RwLock::new(self))
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn get_mempool(&self) -> &MemoryPool {
        &self.mempool
    }

    pub fn tip_info(&self) -> TipInfo {
        self.blockchain.tip_info()
    }

    /// Admits a transaction to the mempool against the current UTXO set
    pub fn submit_transaction(&mut self, tx: Transaction) -> std::result::Result<Hash256, TxError> {
        self.mempool.submit(tx, self.blockchain.get_utxo_set())
    }

    /// Runs a block through the chain manager and brings the mempool up to
    /// date with whatever the active chain did
    pub fn submit_block(&mut self, block: Block, now: i64) -> Result<ChainUpdate> {
        let update = self.blockchain.process_block(block, now)?;
        if !update.connected.is_empty() {
            self.mempool
                .on_chain_update(&update, self.blockchain.get_utxo_set());
        }
        Ok(update)
    }

    /// Unsolved block on the current tip holding as much of the mempool as
    /// fits
    pub fn block_template(&self, owner_pub_key_hash: &[u8], timestamp: i64) -> Result<Block> {
        let room = self
            .blockchain
            .get_params()
            .max_block_transactions
            .saturating_sub(1);
        let candidates = self.mempool.select_for_block(room);
        self.blockchain.new_block_template(
            &self.blockchain.tip(),
            owner_pub_key_hash,
            &candidates,
            timestamp,
        )
    }
}
