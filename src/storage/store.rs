use crate::core::{Block, Hash256, OutPoint, TXOutput};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use log::info;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::{Arc, Mutex};

const BLOCKS_TREE: &str = "blocks";
const CHAINSTATE_TREE: &str = "chainstate";
const UTXO_SNAPSHOT_KEY: &str = "utxo_snapshot";

/// The UTXO set as of `tip`, written every few blocks so a restart can
/// cross-check its replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UtxoSnapshot {
    pub tip: Hash256,
    pub height: u64,
    pub entries: Vec<(OutPoint, TXOutput)>,
}

/// Durable home of the chain: an append-only log of every validated block
/// plus the latest UTXO snapshot. Everything else is rebuilt by replay.
pub trait ChainStore: Send + Sync {
    /// Every persisted block, parents before children
    fn load_chain(&self) -> Result<Vec<Block>>;
    fn persist_block(&self, block: &Block) -> Result<()>;
    fn persist_utxo_snapshot(&self, snapshot: &UtxoSnapshot) -> Result<()>;
    fn load_utxo_snapshot(&self) -> Result<Option<UtxoSnapshot>>;
}

fn sort_for_replay(blocks: &mut [Block]) {
    blocks.sort_by_key(|block| block.get_height());
}

/// Sled backed store, one tree for blocks keyed by hash and one for the
/// snapshot
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<SledStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        info!("Opened chain store at {}", path.display());
        Ok(SledStore { db })
    }
}

impl ChainStore for SledStore {
    fn load_chain(&self) -> Result<Vec<Block>> {
        let blocks_tree = self
            .db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let mut blocks = vec![];
        for item in blocks_tree.iter() {
            let (_, value) = item.map_err(|e| {
                BlockchainError::Database(format!("Failed to iterate blocks tree: {e}"))
            })?;
            blocks.push(Block::deserialize(value.as_ref())?);
        }
        sort_for_replay(&mut blocks);
        Ok(blocks)
    }

    fn persist_block(&self, block: &Block) -> Result<()> {
        let blocks_tree = self
            .db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        blocks_tree
            .insert(block.hash().as_bytes(), block.serialize()?)
            .map_err(|e| BlockchainError::Database(format!("Failed to insert block: {e}")))?;
        blocks_tree
            .flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush blocks: {e}")))?;
        Ok(())
    }

    fn persist_utxo_snapshot(&self, snapshot: &UtxoSnapshot) -> Result<()> {
        let tree = self.db.open_tree(CHAINSTATE_TREE).map_err(|e| {
            BlockchainError::Database(format!("Failed to open chainstate tree: {e}"))
        })?;
        tree.insert(UTXO_SNAPSHOT_KEY, serialize(snapshot)?)
            .map_err(|e| BlockchainError::Database(format!("Failed to write snapshot: {e}")))?;
        tree.flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush snapshot: {e}")))?;
        Ok(())
    }

    fn load_utxo_snapshot(&self) -> Result<Option<UtxoSnapshot>> {
        let tree = self.db.open_tree(CHAINSTATE_TREE).map_err(|e| {
            BlockchainError::Database(format!("Failed to open chainstate tree: {e}"))
        })?;
        match tree
            .get(UTXO_SNAPSHOT_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to read snapshot: {e}")))?
        {
            Some(bytes) => Ok(Some(deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    blocks: Vec<Block>,
    snapshot: Option<UtxoSnapshot>,
}

/// Volatile store for tests and throwaway nodes. Clones share contents, so a
/// test can "restart" a chain on the same store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreInner>> {
        self.inner
            .lock()
            .map_err(|e| BlockchainError::Database(format!("Memory store lock poisoned: {e}")))
    }
}

impl ChainStore for MemoryStore {
    fn load_chain(&self) -> Result<Vec<Block>> {
        let mut blocks = self.lock()?.blocks.clone();
        sort_for_replay(&mut blocks);
        Ok(blocks)
    }

    fn persist_block(&self, block: &Block) -> Result<()> {
        let mut inner = self.lock()?;
        let hash = block.hash();
        if !inner.blocks.iter().any(|b| b.hash() == hash) {
            inner.blocks.push(block.clone());
        }
        Ok(())
    }

    fn persist_utxo_snapshot(&self, snapshot: &UtxoSnapshot) -> Result<()> {
        self.lock()?.snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn load_utxo_snapshot(&self) -> Result<Option<UtxoSnapshot>> {
        Ok(self.lock()?.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusParams;
    use crate::testnet::mine_block_on;
    use tempfile::tempdir;

    fn two_blocks() -> (Block, Block) {
        let params = ConsensusParams::regtest();
        let genesis = Block::genesis(&params);
        let first = mine_block_on(&genesis, &params, vec![]);
        let second = mine_block_on(&first, &params, vec![]);
        (first, second)
    }

    #[test]
    fn test_sled_store_persists_blocks_and_snapshot() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("chain");
        let (first, second) = two_blocks();
        let snapshot = UtxoSnapshot {
            tip: second.hash(),
            height: 2,
            entries: vec![(OutPoint::new(first.get_transactions()[0].id(), 0), TXOutput::new(50, vec![1u8; 20]))],
        };

        {
            let store = SledStore::open(&path).unwrap();
            // written child first, loaded parent first
            store.persist_block(&second).unwrap();
            store.persist_block(&first).unwrap();
            store.persist_utxo_snapshot(&snapshot).unwrap();
        }

        let store = SledStore::open(&path).unwrap();
        let blocks = store.load_chain().unwrap();
        assert_eq!(blocks, vec![first, second]);
        assert_eq!(store.load_utxo_snapshot().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_memory_store_shares_state_between_clones() {
        let (first, second) = two_blocks();
        let store = MemoryStore::new();
        let other = store.clone();

        store.persist_block(&second).unwrap();
        store.persist_block(&first).unwrap();
        store.persist_block(&first).unwrap();

        assert_eq!(other.load_chain().unwrap(), vec![first, second]);
        assert_eq!(other.load_utxo_snapshot().unwrap(), None);
    }
}
