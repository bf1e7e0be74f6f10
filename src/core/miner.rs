use crate::core::chain_state::{read_state, write_state};
use crate::core::{Block, ProofOfWork, SharedChainState};
use crate::error::Result;
use crate::network::SyncCommand;
use crate::utils::current_timestamp;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Mines on top of the active tip, paying rewards to one key hash.
///
/// The template is built under a read lock, the nonce search runs without
/// any lock, and the search is abandoned as soon as the tip moves.
pub struct Miner {
    state: SharedChainState,
    reward_pub_key_hash: Vec<u8>,
    relay: Option<Sender<SyncCommand>>,
}

impl Miner {
    pub fn new(state: SharedChainState, reward_pub_key_hash: Vec<u8>) -> Miner {
        Miner {
            state,
            reward_pub_key_hash,
            relay: None,
        }
    }

    /// Found blocks are handed to the sync worker for broadcast
    pub fn with_relay(mut self, relay: Sender<SyncCommand>) -> Miner {
        self.relay = Some(relay);
        self
    }

    /// One mining attempt. `Ok(None)` means the attempt was cancelled,
    /// either by `shutdown` or because another block took the tip.
    pub fn mine_one(&self, shutdown: &AtomicBool) -> Result<Option<Block>> {
        let (mut block, parent) = {
            let state = read_state(&self.state)?;
            let parent = state.get_blockchain().tip();
            let template = state.block_template(&self.reward_pub_key_hash, current_timestamp()?)?;
            (template, parent)
        };
        debug!(
            "Mining block at height {} with {} transactions",
            block.get_height(),
            block.get_transactions().len()
        );

        let should_stop = || {
            shutdown.load(Ordering::Relaxed)
                || read_state(&self.state)
                    .map(|state| state.get_blockchain().tip() != parent)
                    .unwrap_or(true)
        };
        if !ProofOfWork::mine(block.header_mut(), &should_stop) {
            return Ok(None);
        }

        let update = write_state(&self.state)?.submit_block(block.clone(), current_timestamp()?)?;
        info!(
            "Mined block {} at height {} ({:?})",
            update.hash,
            block.get_height(),
            update.outcome
        );
        if let Some(relay) = &self.relay {
            if relay.send(SyncCommand::RelayBlock(block.clone())).is_err() {
                warn!("Sync worker is gone, mined block {} not relayed", update.hash);
            }
        }
        Ok(Some(block))
    }

    /// Mines until `shutdown` is set
    pub fn run(&self, shutdown: Arc<AtomicBool>) {
        info!("Miner started");
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.mine_one(&shutdown) {
                error!("Mining attempt failed: {e}");
                thread::sleep(RETRY_DELAY);
            }
        }
        info!("Miner stopped");
    }
}
