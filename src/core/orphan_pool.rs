use crate::core::{Block, Hash256};
use log::{debug, info};
use std::collections::{HashMap, VecDeque};

/// Most copies kept for one header hash. Signatures are outside the txid,
/// so copies with the same hash can still differ in their bodies.
const MAX_COPIES: usize = 4;

/// Blocks whose parent has not arrived yet, keyed by that missing parent.
///
/// Only context-free checks have run on these. Bounded: once full the
/// oldest entry is evicted to make room.
pub struct OrphanPool {
    blocks: HashMap<Hash256, Vec<Block>>,
    by_parent: HashMap<Hash256, Vec<Hash256>>,
    arrival: VecDeque<Hash256>,
    capacity: usize,
}

impl OrphanPool {
    pub fn new(capacity: usize) -> OrphanPool {
        OrphanPool {
            blocks: HashMap::new(),
            by_parent: HashMap::new(),
            arrival: VecDeque::new(),
            capacity,
        }
    }

    /// Caches `block`. Returns false when this exact block is already held,
    /// or the pool cannot take it.
    pub fn insert(&mut self, block: Block) -> bool {
        let hash = block.hash();
        if self.capacity == 0 {
            return false;
        }
        if let Some(copies) = self.blocks.get_mut(&hash) {
            if copies.contains(&block) || copies.len() >= MAX_COPIES {
                return false;
            }
            debug!("Cached another body for orphan block {hash}");
            copies.push(block);
            return true;
        }
        while self.blocks.len() >= self.capacity {
            let Some(oldest) = self.arrival.pop_front() else {
                break;
            };
            if self.remove(&oldest).is_some() {
                debug!("Evicted orphan block {oldest}");
            }
        }

        let parent = block.get_pre_block_hash();
        info!(
            "Cached orphan block {hash} at height {} waiting for {parent}",
            block.get_height()
        );
        self.by_parent.entry(parent).or_default().push(hash);
        self.arrival.push_back(hash);
        self.blocks.insert(hash, vec![block]);
        true
    }

    /// Removes and returns every orphan whose parent is `parent`, all cached
    /// bodies of each in arrival order
    pub fn take_children(&mut self, parent: &Hash256) -> Vec<Block> {
        let Some(children) = self.by_parent.remove(parent) else {
            return vec![];
        };
        children
            .iter()
            .filter_map(|hash| {
                self.arrival.retain(|h| h != hash);
                self.blocks.remove(hash)
            })
            .flatten()
            .collect()
    }

    fn remove(&mut self, hash: &Hash256) -> Option<Vec<Block>> {
        let copies = self.blocks.remove(hash)?;
        if let Some(parent) = copies.first().map(Block::get_pre_block_hash) {
            if let Some(siblings) = self.by_parent.get_mut(&parent) {
                siblings.retain(|h| h != hash);
                if siblings.is_empty() {
                    self.by_parent.remove(&parent);
                }
            }
        }
        Some(copies)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Root of the missing ancestry of `hash`: follows orphan parents until
    /// it reaches a hash that is not itself an orphan
    pub fn missing_ancestor(&self, hash: &Hash256) -> Option<Hash256> {
        let mut cursor = self.blocks.get(hash)?.first()?.get_pre_block_hash();
        while let Some(block) = self.blocks.get(&cursor).and_then(|copies| copies.first()) {
            cursor = block.get_pre_block_hash();
        }
        Some(cursor)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
