// The chain manager: every validated block lives in an in-memory tree rooted
// at genesis, and the heaviest branch (by accumulated work) is the active
// chain. The UTXO set always matches the active tip. Blocks are persisted to
// a ChainStore as they are accepted and replayed from it on startup.

use crate::config::ConsensusParams;
use crate::core::monetary::block_reward;
use crate::core::orphan_pool::OrphanPool;
use crate::core::validation::{check_block_sanity, validate_block, validate_transaction, ParentState};
use crate::core::{Block, DifficultyAdjustment, Hash256, ProofOfWork, TXOutput, Transaction};
use crate::error::{BlockError, BlockchainError, Result};
use crate::storage::{BlockUndo, ChainStore, MemoryStore, UTXOSet, UtxoOverlay, UtxoSnapshot, UtxoView};
use crate::utils::current_timestamp;
use log::{debug, error, info, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 100;

/// Where a block sits relative to the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    /// Parent unknown, parked in the orphan pool
    Orphan,
    /// Valid but not on the heaviest branch
    SideBranch,
    Active,
}

/// What submitting a block did to the active chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessOutcome {
    Extended,
    Reorganized { depth: u64 },
    SideBranch,
    Orphaned,
    AlreadyKnown,
}

/// Result of `process_block`: the outcome plus the net change of the active
/// chain, both lists in forward (parent first) order
#[derive(Debug, Clone)]
pub struct ChainUpdate {
    pub hash: Hash256,
    pub outcome: ProcessOutcome,
    pub connected: Vec<Block>,
    pub disconnected: Vec<Block>,
}

impl ChainUpdate {
    fn unchanged(hash: Hash256, outcome: ProcessOutcome) -> ChainUpdate {
        ChainUpdate {
            hash,
            outcome,
            connected: vec![],
            disconnected: vec![],
        }
    }

    pub fn is_reorganization(&self) -> bool {
        !self.disconnected.is_empty()
    }
}

/// Summary of the active tip as announced to peers. Work travels as a hex
/// string since it does not fit in any integer type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipInfo {
    pub height: u64,
    pub hash: Hash256,
    pub chain_work: String,
}

impl TipInfo {
    pub fn new(height: u64, hash: Hash256, chain_work: &BigUint) -> TipInfo {
        TipInfo {
            height,
            hash,
            chain_work: chain_work.to_str_radix(16),
        }
    }

    pub fn work(&self) -> BigUint {
        BigUint::parse_bytes(self.chain_work.as_bytes(), 16).unwrap_or_default()
    }
}

/// Where to start when a peer asks for blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockLocator {
    Height(u64),
    Hash(Hash256),
}

struct BlockEntry {
    block: Block,
    // total work from genesis up to and including this block
    chain_work: BigUint,
}

pub struct Blockchain {
    params: ConsensusParams,
    index: HashMap<Hash256, BlockEntry>,
    // active chain, position = height
    active: Vec<Hash256>,
    utxo: UTXOSet,
    // undo data for every validated block, active or not
    undo: HashMap<Hash256, BlockUndo>,
    orphans: OrphanPool,
    store: Box<dyn ChainStore>,
    // off while replaying the store on startup
    persist: bool,
    snapshot_interval: u64,
}

impl Blockchain {
    /// A fresh chain on a throwaway in-memory store
    pub fn new(params: ConsensusParams) -> Result<Blockchain> {
        Self::open(Box::new(MemoryStore::new()), params)
    }

    /// Opens a chain on `store`, replaying every persisted block through the
    /// same validation as blocks from the network
    pub fn open(store: Box<dyn ChainStore>, params: ConsensusParams) -> Result<Blockchain> {
        params.validate()?;
        let genesis = Block::genesis(&params);
        let genesis_hash = genesis.hash();
        let genesis_work = ProofOfWork::work(&genesis.get_target());

        let mut utxo = UTXOSet::new();
        let genesis_undo = utxo.apply_block(&genesis)?;

        let stored = store.load_chain()?;
        let mut chain = Blockchain {
            orphans: OrphanPool::new(params.max_orphan_blocks),
            params,
            index: HashMap::new(),
            active: vec![genesis_hash],
            utxo,
            undo: HashMap::from([(genesis_hash, genesis_undo)]),
            store,
            persist: false,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        };
        chain.index.insert(
            genesis_hash,
            BlockEntry {
                block: genesis.clone(),
                chain_work: genesis_work,
            },
        );

        if stored.is_empty() {
            info!("Initialising new chain with genesis {genesis_hash}");
            chain.store.persist_block(&genesis)?;
        } else {
            let now = current_timestamp()?;
            let total = stored.len();
            for block in stored {
                let hash = block.hash();
                if let Err(e) = chain.process_block(block, now) {
                    warn!("Skipping stored block {hash}: {e}");
                }
            }
            info!(
                "Replayed {total} stored blocks, active tip {} at height {}",
                chain.tip(),
                chain.best_height()
            );
        }

        chain.check_snapshot()?;
        chain.persist = true;
        Ok(chain)
    }

    pub fn set_snapshot_interval(&mut self, interval: u64) {
        self.snapshot_interval = interval.max(1);
    }

    // The persisted snapshot may be behind the tip; it is checked against the
    // UTXO set rebuilt for its own tip.
    fn check_snapshot(&mut self) -> Result<()> {
        match self.store.load_utxo_snapshot()? {
            Some(snapshot) => {
                let matches = self.index.contains_key(&snapshot.tip)
                    && self.utxo_at(&snapshot.tip)?.to_sorted_entries() == snapshot.entries;
                if matches {
                    info!(
                        "UTXO snapshot at height {} matches the replayed chain",
                        snapshot.height
                    );
                } else {
                    warn!("UTXO snapshot disagrees with the replayed chain, rewriting it");
                    self.persist_snapshot()?;
                }
            }
            None => self.persist_snapshot()?,
        }
        Ok(())
    }

    /// Writes the current UTXO set as the snapshot for the active tip
    pub fn persist_snapshot(&self) -> Result<()> {
        let snapshot = UtxoSnapshot {
            tip: self.tip(),
            height: self.best_height(),
            entries: self.utxo.to_sorted_entries(),
        };
        self.store.persist_utxo_snapshot(&snapshot)?;
        debug!("Wrote UTXO snapshot at height {}", snapshot.height);
        Ok(())
    }

    /// Entry point for every block, local or remote.
    ///
    /// Rejections come back as `BlockchainError::Block` and leave the chain
    /// untouched. An unknown parent is not an error: the block is parked and
    /// the outcome is `Orphaned`.
    pub fn process_block(&mut self, block: Block, now: i64) -> Result<ChainUpdate> {
        let hash = block.hash();
        if self.index.contains_key(&hash) {
            return Ok(ChainUpdate::unchanged(hash, ProcessOutcome::AlreadyKnown));
        }

        let parent = block.get_pre_block_hash();
        if !self.index.contains_key(&parent) {
            if parent.is_zero() {
                return Err(BlockError::InvalidHeader(format!(
                    "block {hash} claims to be a second genesis"
                ))
                .into());
            }
            check_block_sanity(&block, &self.params)?;
            if !self.orphans.insert(block) {
                return Ok(ChainUpdate::unchanged(hash, ProcessOutcome::AlreadyKnown));
            }
            return Ok(ChainUpdate::unchanged(hash, ProcessOutcome::Orphaned));
        }

        let old_tip = self.tip();
        let old_height = self.best_height();
        self.accept_block(block, now)?;

        // Orphans waiting on this block, and on those, and so on
        let mut queue = vec![hash];
        while let Some(parent) = queue.pop() {
            for orphan in self.orphans.take_children(&parent) {
                let orphan_hash = orphan.hash();
                if self.index.contains_key(&orphan_hash) {
                    continue;
                }
                match self.accept_block(orphan, now) {
                    Ok(()) => queue.push(orphan_hash),
                    Err(e) => warn!("Dropped orphan block {orphan_hash}: {e}"),
                }
            }
        }

        let update = self.diff_since(hash, old_tip, old_height)?;
        if !update.connected.is_empty()
            && self.persist
            && (update.is_reorganization()
                || self.best_height() / self.snapshot_interval != old_height / self.snapshot_interval)
        {
            if let Err(e) = self.persist_snapshot() {
                error!("Failed to persist UTXO snapshot: {e}");
            }
        }
        Ok(update)
    }

    // Validates a block whose parent is indexed, indexes it and moves the
    // active chain if it is now the heaviest tip.
    fn accept_block(&mut self, block: Block, now: i64) -> Result<()> {
        let hash = block.hash();
        let parent_hash = block.get_pre_block_hash();
        let (parent_height, parent_timestamp, parent_work) = {
            let parent = self.entry(&parent_hash)?;
            (
                parent.block.get_height(),
                parent.block.get_timestamp(),
                parent.chain_work.clone(),
            )
        };
        let next_target = self.next_target(&parent_hash)?;
        let extends_tip = parent_hash == self.tip();

        // UTXO state as of the parent. Only side branches need a scratch copy.
        let scratch = if extends_tip {
            None
        } else {
            Some(self.utxo_at(&parent_hash)?)
        };

        let validated = {
            let view: &UTXOSet = scratch.as_ref().unwrap_or(&self.utxo);
            let parent_state = ParentState {
                hash: parent_hash,
                height: parent_height,
                timestamp: parent_timestamp,
                next_target,
                utxo: view,
            };
            validate_block(&block, Some(&parent_state), &self.params, now)?
        };
        let chain_work = parent_work + &validated.work;
        let height = block.get_height();

        if self.persist {
            if let Err(e) = self.store.persist_block(&block) {
                error!("Failed to persist block {hash}: {e}");
            }
        }

        match scratch {
            None => {
                let undo = self.utxo.apply_block(&block)?;
                self.undo.insert(hash, undo);
                self.index.insert(hash, BlockEntry { block, chain_work });
                self.active.push(hash);
                info!(
                    "Block {hash} extends the active chain to height {height} ({} fees)",
                    validated.fees
                );
            }
            Some(mut branch_utxo) => {
                let undo = branch_utxo.apply_block(&block)?;
                self.undo.insert(hash, undo);
                let heavier = chain_work > self.chain_work();
                self.index.insert(hash, BlockEntry { block, chain_work });
                if heavier {
                    self.reorganize(hash, branch_utxo)?;
                } else {
                    info!("Block {hash} at height {height} stored on a side branch");
                }
            }
        }
        Ok(())
    }

    // Commits a heavier branch. `branch_utxo` is already the UTXO set as of
    // `new_tip`; nothing is mutated until it is known to be complete.
    fn reorganize(&mut self, new_tip: Hash256, branch_utxo: UTXOSet) -> Result<()> {
        let (fork_height, branch) = self.branch_from_active(&new_tip)?;
        let depth = self.best_height() - fork_height;
        let old_tip = self.tip();

        self.active.truncate(fork_height as usize + 1);
        self.active.extend(branch);
        self.utxo = branch_utxo;

        warn!(
            "Chain reorganization: {old_tip} replaced by {new_tip}, {depth} blocks disconnected at fork height {fork_height}"
        );
        Ok(())
    }

    // Net change of the active chain since `old_tip`
    fn diff_since(&self, hash: Hash256, old_tip: Hash256, old_height: u64) -> Result<ChainUpdate> {
        let (fork_height, disconnected_hashes) = self.branch_from_active(&old_tip)?;
        let disconnected: Vec<Block> = disconnected_hashes
            .iter()
            .map(|h| self.entry(h).map(|entry| entry.block.clone()))
            .collect::<Result<_>>()?;
        let first_connected = if disconnected.is_empty() {
            old_height + 1
        } else {
            fork_height + 1
        };
        let connected: Vec<Block> = self.active[first_connected as usize..]
            .iter()
            .map(|h| self.entry(h).map(|entry| entry.block.clone()))
            .collect::<Result<_>>()?;

        let outcome = if !disconnected.is_empty() {
            ProcessOutcome::Reorganized {
                depth: disconnected.len() as u64,
            }
        } else if !connected.is_empty() {
            ProcessOutcome::Extended
        } else {
            ProcessOutcome::SideBranch
        };
        Ok(ChainUpdate {
            hash,
            outcome,
            connected,
            disconnected,
        })
    }

    fn entry(&self, hash: &Hash256) -> Result<&BlockEntry> {
        self.index
            .get(hash)
            .ok_or_else(|| BlockchainError::Database(format!("Block {hash} is not indexed")))
    }

    // Walks back from `hash` to the first block on the active chain. Returns
    // that fork height and the blocks after it, parent first.
    fn branch_from_active(&self, hash: &Hash256) -> Result<(u64, Vec<Hash256>)> {
        let mut branch = vec![];
        let mut cursor = *hash;
        loop {
            let entry = self.entry(&cursor)?;
            let height = entry.block.get_height();
            if self.active_hash_at(height) == Some(cursor) {
                branch.reverse();
                return Ok((height, branch));
            }
            branch.push(cursor);
            cursor = entry.block.get_pre_block_hash();
        }
    }

    /// The UTXO set as it was (or would be) right after `hash`. Computed on
    /// a copy: roll the active chain back to the fork, then replay the
    /// branch.
    pub fn utxo_at(&self, hash: &Hash256) -> Result<UTXOSet> {
        let (fork_height, branch) = self.branch_from_active(hash)?;
        let mut scratch = self.utxo.clone();
        for active_hash in self.active[fork_height as usize + 1..].iter().rev() {
            let undo = self.undo.get(active_hash).ok_or_else(|| {
                BlockchainError::Database(format!("Missing undo data for {active_hash}"))
            })?;
            scratch.rollback_block(undo);
        }
        for branch_hash in &branch {
            scratch.apply_block(&self.entry(branch_hash)?.block)?;
        }
        Ok(scratch)
    }

    fn ancestor_at(&self, hash: &Hash256, height: u64) -> Result<&Block> {
        let mut entry = self.entry(hash)?;
        while entry.block.get_height() > height {
            entry = self.entry(&entry.block.get_pre_block_hash())?;
        }
        Ok(&entry.block)
    }

    /// Target a child of `parent_hash` has to carry
    pub fn next_target(&self, parent_hash: &Hash256) -> Result<Hash256> {
        let parent = &self.entry(parent_hash)?.block;
        let height = parent.get_height() + 1;
        if !DifficultyAdjustment::is_adjustment_height(height, &self.params) {
            return Ok(parent.get_target());
        }
        let start_height = DifficultyAdjustment::window_start_height(height, &self.params);
        let window_start = self.ancestor_at(parent_hash, start_height)?;
        Ok(DifficultyAdjustment::calculate_next_target(
            &parent.get_target(),
            window_start.get_timestamp(),
            parent.get_timestamp(),
            parent.get_height() - start_height,
            &self.params,
        ))
    }

    /// Unsolved block on top of `parent` paying the reward and the fees of
    /// whichever `candidates` are still valid to `owner_pub_key_hash`.
    /// Candidates are taken in order; invalid ones are skipped.
    pub fn new_block_template(
        &self,
        parent: &Hash256,
        owner_pub_key_hash: &[u8],
        candidates: &[Transaction],
        timestamp: i64,
    ) -> Result<Block> {
        let parent_block = &self.entry(parent)?.block;
        let height = parent_block.get_height() + 1;
        let scratch = if *parent == self.tip() {
            None
        } else {
            Some(self.utxo_at(parent)?)
        };
        let base: &UTXOSet = scratch.as_ref().unwrap_or(&self.utxo);

        let mut overlay = UtxoOverlay::new(base);
        let mut included = vec![];
        let mut fees: u64 = 0;
        let room = self.params.max_block_transactions.saturating_sub(1);
        for tx in candidates {
            if included.len() >= room {
                break;
            }
            match validate_transaction(tx, &overlay) {
                Ok(validated) => {
                    if tx.outpoints().any(|outpoint| overlay.get_output(&outpoint).is_some()) {
                        continue;
                    }
                    overlay.apply(tx);
                    fees = fees.saturating_add(validated.fee);
                    included.push(tx.clone());
                }
                Err(e) => debug!("Left {} out of the block template: {e}", tx.id()),
            }
        }

        let tag: [u8; 8] = rand::random();
        let coinbase = Transaction::new_coinbase(
            height,
            vec![TXOutput::new(
                block_reward(height, &self.params).saturating_add(fees),
                owner_pub_key_hash.to_vec(),
            )],
            &tag,
        );
        let mut transactions = vec![coinbase];
        transactions.extend(included);

        Ok(Block::assemble(
            height,
            *parent,
            timestamp.max(parent_block.get_timestamp()),
            self.next_target(parent)?,
            transactions,
        ))
    }

    pub fn tip(&self) -> Hash256 {
        // genesis is always active
        self.active.last().copied().unwrap_or_default()
    }

    pub fn best_height(&self) -> u64 {
        self.active.len() as u64 - 1
    }

    pub fn chain_work(&self) -> BigUint {
        self.index
            .get(&self.tip())
            .map(|entry| entry.chain_work.clone())
            .unwrap_or_default()
    }

    pub fn tip_info(&self) -> TipInfo {
        TipInfo::new(self.best_height(), self.tip(), &self.chain_work())
    }

    pub fn get_block(&self, hash: &Hash256) -> Option<&Block> {
        self.index.get(hash).map(|entry| &entry.block)
    }

    pub fn contains_block(&self, hash: &Hash256) -> bool {
        self.index.contains_key(hash) || self.orphans.contains(hash)
    }

    pub fn block_status(&self, hash: &Hash256) -> Option<BlockStatus> {
        if let Some(entry) = self.index.get(hash) {
            if self.active_hash_at(entry.block.get_height()) == Some(*hash) {
                return Some(BlockStatus::Active);
            }
            return Some(BlockStatus::SideBranch);
        }
        if self.orphans.contains(hash) {
            return Some(BlockStatus::Orphan);
        }
        None
    }

    pub fn active_hash_at(&self, height: u64) -> Option<Hash256> {
        self.active.get(height as usize).copied()
    }

    /// Up to `max` active blocks following `locator`. A hash on a side
    /// branch resolves to its fork point; an unknown hash yields nothing.
    pub fn blocks_after(&self, locator: &BlockLocator, max: usize) -> Vec<Block> {
        let start = match locator {
            BlockLocator::Height(height) => height.saturating_add(1),
            BlockLocator::Hash(hash) => {
                if !self.index.contains_key(hash) {
                    return vec![];
                }
                match self.branch_from_active(hash) {
                    Ok((fork_height, _)) => fork_height + 1,
                    Err(_) => return vec![],
                }
            }
        };
        self.active
            .iter()
            .skip(start as usize)
            .take(max)
            .filter_map(|hash| self.get_block(hash).cloned())
            .collect()
    }

    /// Active blocks from the tip back to genesis
    pub fn active_blocks(&self) -> impl Iterator<Item = &Block> {
        self.active
            .iter()
            .rev()
            .filter_map(|hash| self.get_block(hash))
    }

    /// Oldest missing ancestor of an orphan, the block to ask a peer for
    pub fn orphan_root(&self, hash: &Hash256) -> Option<Hash256> {
        self.orphans.missing_ancestor(hash)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn get_utxo_set(&self) -> &UTXOSet {
        &self.utxo
    }

    pub fn get_params(&self) -> &ConsensusParams {
        &self.params
    }
}
