//! Test utilities for building chains by hand

use crate::config::ConsensusParams;
use crate::core::monetary::block_reward;
use crate::core::{Block, OutPoint, ProofOfWork, TXInput, TXOutput, Transaction};
use crate::wallet::Wallet;

/// Key hash that collects rewards nobody in a test cares about
pub const BURN_PUB_KEY_HASH: [u8; 20] = [0xab; 20];

/// Parameters with an easy target so tests mine in a few hashes
pub fn regtest_params() -> ConsensusParams {
    ConsensusParams::regtest()
}

/// Mines a child of `parent` with `transactions` after a coinbase paying
/// the block reward to `pub_key_hash`. Keeps the parent's target, which is
/// right for any height that is not a retarget point.
pub fn mine_block_paying(
    parent: &Block,
    params: &ConsensusParams,
    pub_key_hash: &[u8],
    transactions: Vec<Transaction>,
) -> Block {
    let height = parent.get_height() + 1;
    let tag: [u8; 8] = rand::random();
    let coinbase = Transaction::new_coinbase(
        height,
        vec![TXOutput::new(block_reward(height, params), pub_key_hash.to_vec())],
        &tag,
    );
    let mut all = vec![coinbase];
    all.extend(transactions);

    let mut block = Block::assemble(
        height,
        parent.hash(),
        parent.get_timestamp() + params.target_block_time_ms as i64,
        parent.get_target(),
        all,
    );
    assert!(ProofOfWork::mine(block.header_mut(), &|| false));
    block
}

pub fn mine_block_on(parent: &Block, params: &ConsensusParams, transactions: Vec<Transaction>) -> Block {
    mine_block_paying(parent, params, &BURN_PUB_KEY_HASH, transactions)
}

/// Spends `inputs` (all owned by `wallet`) into one output per recipient
pub fn signed_spend(wallet: &Wallet, inputs: &[OutPoint], outputs: &[(u64, &Wallet)]) -> Transaction {
    let vin = inputs.iter().map(|outpoint| TXInput::new(*outpoint)).collect();
    let vout = outputs
        .iter()
        .map(|(value, to)| TXOutput::new(*value, to.get_pub_key_hash()))
        .collect();
    let mut tx = Transaction::new(vin, vout);
    wallet.sign_transaction(&mut tx).unwrap();
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mined_blocks_link_and_meet_target() {
        let params = regtest_params();
        let genesis = Block::genesis(&params);
        let first = mine_block_on(&genesis, &params, vec![]);
        let second = mine_block_on(&first, &params, vec![]);

        assert_eq!(second.get_pre_block_hash(), first.hash());
        assert_eq!(second.get_height(), 2);
        assert!(ProofOfWork::validate(second.get_header()));
        assert!(second.verify_merkle_root());
        assert_eq!(second.get_transactions()[0].coinbase_height(), Some(2));
    }

    #[test]
    fn test_sibling_blocks_differ() {
        let params = regtest_params();
        let genesis = Block::genesis(&params);
        let a = mine_block_on(&genesis, &params, vec![]);
        let b = mine_block_on(&genesis, &params, vec![]);
        assert_ne!(a.get_transactions()[0].id(), b.get_transactions()[0].id());
    }
}
