use crate::core::chain_state::{read_state, write_state};
use crate::core::{
    Block, BlockLocator, ChainUpdate, Hash256, ProcessOutcome, SharedChainState, Transaction,
};
use crate::error::{BlockchainError, Result};
use crate::network::protocol::Response;
use crate::network::PeerTransport;
use crate::utils::current_timestamp;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How far back a node walks a peer's branch looking for a block it knows
pub const MAX_ANCESTOR_DEPTH: usize = 1_000;

const COMMAND_POLL: Duration = Duration::from_millis(250);

// Locator entries taken one height apart before the step starts doubling
const DENSE_LOCATOR_ENTRIES: usize = 10;

/// Heights of our active chain offered to a peer when looking for the
/// fork point: the tip and the blocks right below it, then exponentially
/// sparser, always ending at genesis
pub fn locator_heights(tip: u64) -> Vec<u64> {
    let mut heights = vec![];
    let mut height = tip;
    let mut step = 1;
    loop {
        heights.push(height);
        if height == 0 {
            return heights;
        }
        if heights.len() >= DENSE_LOCATOR_ENTRIES {
            step *= 2;
        }
        height = height.saturating_sub(step);
    }
}

/// Work handed to the sync thread by the server and the miner
#[derive(Debug, Clone)]
pub enum SyncCommand {
    /// An orphan arrived from `peer`; fetch its missing ancestors from there
    ResolveOrphan { peer: String, hash: Hash256 },
    RelayTransaction(Transaction),
    RelayBlock(Block),
}

/// Pulls missing blocks from peers and pushes local news to them.
///
/// All network calls happen outside the chain state lock; fetched blocks
/// are then applied one at a time through the normal block path.
pub struct Synchronizer<T: PeerTransport> {
    state: SharedChainState,
    transport: T,
    peers: Vec<String>,
    /// Our own listening address, sent along with relayed blocks
    node_addr: Option<String>,
    max_ancestor_depth: usize,
}

impl<T: PeerTransport> Synchronizer<T> {
    pub fn new(state: SharedChainState, transport: T, peers: Vec<String>) -> Self {
        Self {
            state,
            transport,
            peers,
            node_addr: None,
            max_ancestor_depth: MAX_ANCESTOR_DEPTH,
        }
    }

    pub fn with_node_addr(mut self, node_addr: String) -> Self {
        self.node_addr = Some(node_addr);
        self
    }

    pub fn with_max_ancestor_depth(mut self, depth: usize) -> Self {
        self.max_ancestor_depth = depth;
        self
    }

    fn apply(&self, block: Block) -> Result<ChainUpdate> {
        let now = current_timestamp()?;
        write_state(&self.state)?.submit_block(block, now)
    }

    fn is_indexed(&self, hash: &Hash256) -> Result<bool> {
        Ok(read_state(&self.state)?
            .get_blockchain()
            .get_block(hash)
            .is_some())
    }

    /// Catches up with `peer` if its tip carries more work than ours.
    /// Returns how many fetched blocks were new to us.
    pub fn sync_with_peer(&self, peer: &str) -> Result<usize> {
        let remote = self.transport.get_tip(peer)?;
        let (local_tip, local_work) = {
            let state = read_state(&self.state)?;
            (state.get_blockchain().tip(), state.get_blockchain().chain_work())
        };
        if remote.work() <= local_work {
            debug!("Peer {peer} has no more work than us (height {})", remote.height);
            return Ok(0);
        }
        info!(
            "Peer {peer} is ahead (height {}, tip {}), synchronizing",
            remote.height, remote.hash
        );

        let mut applied = 0;
        let mut previous_last = None;
        let mut blocks = self.first_connecting_batch(peer, local_tip)?;
        while let Some(last) = blocks.last().map(Block::hash) {
            if previous_last == Some(last) {
                break;
            }
            for block in blocks {
                if self.apply(block)?.outcome != ProcessOutcome::AlreadyKnown {
                    applied += 1;
                }
            }
            if last == remote.hash {
                break;
            }
            previous_last = Some(last);
            blocks = self.transport.get_blocks(peer, BlockLocator::Hash(last))?;
        }

        // No locator entry reached the peer's chain: walk its branch back
        if !self.is_indexed(&remote.hash)? {
            applied += self.fetch_ancestors(peer, remote.hash)?;
        }
        info!("Synchronized {applied} blocks from {peer}");
        Ok(applied)
    }

    /// First batch the peer sends after the newest of our locator hashes it
    /// has on its active chain. Empty when none of them connects.
    fn first_connecting_batch(&self, peer: &str, local_tip: Hash256) -> Result<Vec<Block>> {
        let locator: Vec<Hash256> = {
            let state = read_state(&self.state)?;
            let chain = state.get_blockchain();
            locator_heights(chain.best_height())
                .into_iter()
                .filter_map(|height| chain.active_hash_at(height))
                .collect()
        };
        for hash in locator {
            let blocks = self.transport.get_blocks(peer, BlockLocator::Hash(hash))?;
            let Some(first) = blocks.first() else {
                continue;
            };
            if self.is_indexed(&first.get_pre_block_hash())? {
                if hash != local_tip {
                    debug!("Peer {peer} connects to our chain below the tip, at {hash}");
                }
                return Ok(blocks);
            }
        }
        Ok(vec![])
    }

    /// Fetches `hash` and its ancestors one by one until reaching a block we
    /// have, then applies them oldest first
    pub fn fetch_ancestors(&self, peer: &str, hash: Hash256) -> Result<usize> {
        let mut fetched = vec![];
        let mut cursor = hash;
        while !self.is_indexed(&cursor)? {
            if fetched.len() >= self.max_ancestor_depth {
                return Err(BlockchainError::Network(format!(
                    "No common ancestor with {peer} within {} blocks",
                    self.max_ancestor_depth
                )));
            }
            let block = self.transport.get_block(peer, cursor)?.ok_or_else(|| {
                BlockchainError::Network(format!("Peer {peer} does not have block {cursor}"))
            })?;
            if block.hash() != cursor {
                return Err(BlockchainError::Network(format!(
                    "Peer {peer} answered a request for {cursor} with {}",
                    block.hash()
                )));
            }
            cursor = block.get_pre_block_hash();
            fetched.push(block);
        }

        let count = fetched.len();
        for block in fetched.into_iter().rev() {
            self.apply(block)?;
        }
        debug!("Fetched {count} ancestors of {hash} from {peer}");
        Ok(count)
    }

    /// Connects an orphan by fetching what it is missing from `peer`
    pub fn resolve_orphan(&self, peer: &str, hash: &Hash256) -> Result<usize> {
        let root = read_state(&self.state)?.get_blockchain().orphan_root(hash);
        match root {
            Some(missing) => self.fetch_ancestors(peer, missing),
            None => Ok(0),
        }
    }

    /// One synchronization round against every configured peer. A failing
    /// peer is logged and skipped.
    pub fn poll_peers(&self) {
        for peer in &self.peers {
            if let Err(e) = self.sync_with_peer(peer) {
                warn!("Sync with {peer} failed: {e}");
            }
        }
    }

    pub fn broadcast_transaction(&self, transaction: &Transaction) {
        for peer in &self.peers {
            match self.transport.submit_transaction(peer, transaction) {
                Ok(Response::TransactionRejected(reason)) => {
                    debug!("Peer {peer} declined {}: {reason}", transaction.id())
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to relay transaction to {peer}: {e}"),
            }
        }
    }

    pub fn broadcast_block(&self, block: &Block) {
        for peer in &self.peers {
            match self
                .transport
                .submit_block(peer, block, self.node_addr.as_deref())
            {
                Ok(Response::BlockRejected(reason)) => {
                    warn!("Peer {peer} rejected block {}: {reason}", block.hash())
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to relay block to {peer}: {e}"),
            }
        }
    }

    pub fn handle_command(&self, command: SyncCommand) {
        match command {
            SyncCommand::ResolveOrphan { peer, hash } => {
                if let Err(e) = self.resolve_orphan(&peer, &hash) {
                    warn!("Could not resolve orphan {hash} from {peer}: {e}");
                }
            }
            SyncCommand::RelayTransaction(transaction) => self.broadcast_transaction(&transaction),
            SyncCommand::RelayBlock(block) => self.broadcast_block(&block),
        }
    }

    /// Serves commands and polls peers every `interval` until `shutdown`
    /// is set or every sender is gone
    pub fn run(&self, commands: Receiver<SyncCommand>, interval: Duration, shutdown: Arc<AtomicBool>) {
        info!("Sync worker started with {} peers", self.peers.len());
        self.poll_peers();
        let mut last_poll = Instant::now();
        while !shutdown.load(Ordering::Relaxed) {
            match commands.recv_timeout(COMMAND_POLL) {
                Ok(command) => self.handle_command(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if last_poll.elapsed() >= interval {
                self.poll_peers();
                last_poll = Instant::now();
            }
        }
        info!("Sync worker stopped");
    }
}
