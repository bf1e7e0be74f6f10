//! Chain building helpers shared by the integration tests

#![allow(dead_code)]

use powledger::{
    block_reward, Block, Blockchain, ConsensusParams, Hash256, ProofOfWork, TXOutput, Transaction,
};

/// "now" for block acceptance, far enough out that no test timestamp is
/// ever considered to be in the future
pub const FAR_FUTURE: i64 = i64::MAX / 2;

pub fn params() -> ConsensusParams {
    ConsensusParams::regtest()
}

/// Solves a block at an explicit target, coinbase first
pub fn solve(
    parent: &Block,
    target: Hash256,
    timestamp: i64,
    pub_key_hash: &[u8],
    transactions: Vec<Transaction>,
    params: &ConsensusParams,
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

    let mut block = Block::assemble(height, parent.hash(), timestamp, target, all);
    assert!(ProofOfWork::mine(block.header_mut(), &|| false));
    block
}

/// Child of `parent` carrying whatever target `chain` requires,
/// `spacing_ms` after its parent
pub fn mine_child(
    chain: &Blockchain,
    parent: &Block,
    pub_key_hash: &[u8],
    transactions: Vec<Transaction>,
    spacing_ms: i64,
) -> Block {
    let target = chain.next_target(&parent.hash()).unwrap();
    solve(
        parent,
        target,
        parent.get_timestamp() + spacing_ms,
        pub_key_hash,
        transactions,
        chain.get_params(),
    )
}

/// Mines and connects `count` empty blocks on top of `parent`
pub fn extend(chain: &mut Blockchain, parent: &Block, count: usize, pub_key_hash: &[u8]) -> Vec<Block> {
    let mut parent = parent.clone();
    let mut blocks = vec![];
    for _ in 0..count {
        let block = mine_child(chain, &parent, pub_key_hash, vec![], 1_000);
        chain.process_block(block.clone(), FAR_FUTURE).unwrap();
        parent = block.clone();
        blocks.push(block);
    }
    blocks
}
