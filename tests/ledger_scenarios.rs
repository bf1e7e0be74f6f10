//! End-to-end ledger scenarios
//!
//! Spending, forks and reorganizations, retargeting and restarts, driven
//! through the public API the node itself uses.

mod common;

use common::{extend, mine_child, params, solve, FAR_FUTURE};
use powledger::{
    BlockError, BlockStatus, Blockchain, BlockchainError, ChainState, ConsensusParams, OutPoint,
    ProcessOutcome, ProofOfWork, SledStore, TxError, UTXOSet, Wallet,
};
use tempfile::tempdir;

const MINER: [u8; 20] = [0x11; 20];

#[test]
fn test_payment_splits_output_and_blocks_respend() {
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let mut state = ChainState::new(Blockchain::new(params()).unwrap());

    // block 1 pays the full reward to alice
    let genesis = state.get_blockchain().active_blocks().last().unwrap().clone();
    let first = mine_child(state.get_blockchain(), &genesis, &alice.get_pub_key_hash(), vec![], 1_000);
    state.submit_block(first.clone(), FAR_FUTURE).unwrap();
    let utxo = state.get_blockchain().get_utxo_set();
    assert_eq!(utxo.balance(&alice.get_pub_key_hash()), 50);

    let payment = alice
        .create_payment(
            &utxo.find_outputs(&alice.get_pub_key_hash()),
            &bob.get_pub_key_hash(),
            20,
            0,
        )
        .unwrap();
    let spent = *payment.get_vin()[0].get_prev();
    assert_eq!(spent, OutPoint::new(first.get_transactions()[0].id(), 0));
    state.submit_transaction(payment.clone()).unwrap();

    let mut template = state
        .block_template(&MINER, first.get_timestamp() + 1_000)
        .unwrap();
    assert!(ProofOfWork::mine(template.header_mut(), &|| false));
    let update = state.submit_block(template, FAR_FUTURE).unwrap();
    assert_eq!(update.outcome, ProcessOutcome::Extended);
    assert!(state.get_mempool().is_empty());

    let utxo = state.get_blockchain().get_utxo_set();
    assert_eq!(utxo.balance(&bob.get_pub_key_hash()), 20);
    assert_eq!(utxo.balance(&alice.get_pub_key_hash()), 30);
    assert!(!utxo.contains(&spent));

    // the block 1 output is gone, spending it again is refused
    let respend = alice
        .create_payment(
            &[(spent, first.get_transactions()[0].get_vout()[0].clone())],
            &bob.get_pub_key_hash(),
            50,
            0,
        )
        .unwrap();
    assert_eq!(
        state.submit_transaction(respend),
        Err(TxError::MissingInput { outpoint: spent })
    );
}

#[test]
fn test_heavier_branch_reorganizes_and_returns_transactions() {
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let mut state = ChainState::new(Blockchain::new(params()).unwrap());
    let genesis = state.get_blockchain().active_blocks().last().unwrap().clone();

    let first = mine_child(state.get_blockchain(), &genesis, &alice.get_pub_key_hash(), vec![], 1_000);
    state.submit_block(first.clone(), FAR_FUTURE).unwrap();
    let mut parent = first;
    for _ in 2..=4 {
        let block = mine_child(state.get_blockchain(), &parent, &MINER, vec![], 1_000);
        state.submit_block(block.clone(), FAR_FUTURE).unwrap();
        parent = block;
    }
    let fork_point = parent;

    // height 5 on the active chain carries alice's payment
    let payment = alice
        .create_payment(
            &state
                .get_blockchain()
                .get_utxo_set()
                .find_outputs(&alice.get_pub_key_hash()),
            &bob.get_pub_key_hash(),
            20,
            5,
        )
        .unwrap();
    state.submit_transaction(payment.clone()).unwrap();
    let with_payment = mine_child(
        state.get_blockchain(),
        &fork_point,
        &MINER,
        vec![payment.clone()],
        1_000,
    );
    state.submit_block(with_payment.clone(), FAR_FUTURE).unwrap();
    assert!(state.get_mempool().is_empty());
    assert_eq!(
        state.get_blockchain().get_utxo_set().balance(&bob.get_pub_key_hash()),
        20
    );

    // a competing height 5 has equal work, the first seen branch stays
    let rival = mine_child(state.get_blockchain(), &fork_point, &MINER, vec![], 2_000);
    let update = state.submit_block(rival.clone(), FAR_FUTURE).unwrap();
    assert_eq!(update.outcome, ProcessOutcome::SideBranch);
    assert_eq!(state.get_blockchain().tip(), with_payment.hash());

    // height 6 on the rival makes it heavier
    let rival_child = mine_child(state.get_blockchain(), &rival, &MINER, vec![], 1_000);
    let update = state.submit_block(rival_child.clone(), FAR_FUTURE).unwrap();
    assert_eq!(update.outcome, ProcessOutcome::Reorganized { depth: 1 });
    assert_eq!(update.disconnected, vec![with_payment.clone()]);
    assert_eq!(update.connected, vec![rival.clone(), rival_child.clone()]);

    let chain = state.get_blockchain();
    assert_eq!(chain.tip(), rival_child.hash());
    assert_eq!(chain.best_height(), 6);
    assert_eq!(chain.block_status(&with_payment.hash()), Some(BlockStatus::SideBranch));
    assert_eq!(chain.get_utxo_set().balance(&bob.get_pub_key_hash()), 0);
    assert_eq!(chain.get_utxo_set().balance(&alice.get_pub_key_hash()), 50);
    assert!(state.get_mempool().contains(&payment.id()));

    // the active set is exactly what replaying the active chain produces
    let mut active: Vec<_> = chain.active_blocks().cloned().collect();
    active.reverse();
    let replayed = UTXOSet::replay(active.iter()).unwrap();
    assert_eq!(replayed.to_sorted_entries(), chain.get_utxo_set().to_sorted_entries());

    // every block again, in any order, changes nothing
    let mut all = active.clone();
    all.push(with_payment);
    for block in all.into_iter().rev() {
        let update = state.submit_block(block, FAR_FUTURE).unwrap();
        assert_eq!(update.outcome, ProcessOutcome::AlreadyKnown);
    }
    assert_eq!(state.get_blockchain().tip(), rival_child.hash());
}

#[test]
fn test_arrival_order_does_not_change_the_outcome() {
    let mut source = Blockchain::new(params()).unwrap();
    let genesis = source.active_blocks().last().unwrap().clone();
    let main = extend(&mut source, &genesis, 4, &MINER);
    let side = extend(&mut source, &main[1], 3, &[0x22; 20]);
    assert_eq!(source.tip(), side[2].hash());

    // children before parents: everything waits as an orphan first
    let mut shuffled = Blockchain::new(params()).unwrap();
    let mut arrivals: Vec<_> = main.iter().chain(side.iter()).cloned().collect();
    arrivals.reverse();
    for block in arrivals {
        shuffled.process_block(block, FAR_FUTURE).unwrap();
    }

    assert_eq!(shuffled.orphan_count(), 0);
    assert_eq!(shuffled.tip(), source.tip());
    assert_eq!(shuffled.chain_work(), source.chain_work());
    assert_eq!(
        shuffled.get_utxo_set().to_sorted_entries(),
        source.get_utxo_set().to_sorted_entries()
    );
    assert_eq!(shuffled.block_status(&main[3].hash()), Some(BlockStatus::SideBranch));
}

#[test]
fn test_difficulty_follows_block_spacing() {
    let params = ConsensusParams {
        retarget_interval: 4,
        target_block_time_ms: 1_000,
        max_adjustment_factor: 4,
        ..params()
    };
    let mut chain = Blockchain::new(params.clone()).unwrap();
    let genesis = chain.active_blocks().last().unwrap().clone();
    assert_eq!(genesis.get_target(), params.pow_limit);

    // three quick blocks close the first window
    let mut parent = genesis;
    for _ in 1..=3 {
        let block = mine_child(&chain, &parent, &MINER, vec![], 250);
        assert_eq!(block.get_target(), params.pow_limit);
        chain.process_block(block.clone(), FAR_FUTURE).unwrap();
        parent = block;
    }

    let harder = chain.next_target(&parent.hash()).unwrap();
    assert!(harder < parent.get_target());

    // the old target is no longer good enough at the retarget height
    let stale = solve(
        &parent,
        parent.get_target(),
        parent.get_timestamp() + 250,
        &MINER,
        vec![],
        &params,
    );
    assert!(matches!(
        chain.process_block(stale, FAR_FUTURE),
        Err(BlockchainError::Block(BlockError::InvalidHeader(_)))
    ));

    // then a slow window eases it again, never past the limit
    for _ in 4..=7 {
        let block = mine_child(&chain, &parent, &MINER, vec![], 10_000);
        chain.process_block(block.clone(), FAR_FUTURE).unwrap();
        parent = block;
    }
    assert_eq!(parent.get_target(), harder);
    let easier = chain.next_target(&parent.hash()).unwrap();
    assert!(easier > harder);
    assert!(easier <= params.pow_limit);
}

#[test]
fn test_chain_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chain");

    let (tip, entries) = {
        let store = SledStore::open(&path).unwrap();
        let mut chain = Blockchain::open(Box::new(store), params()).unwrap();
        chain.set_snapshot_interval(2);
        let genesis = chain.active_blocks().last().unwrap().clone();
        let main = extend(&mut chain, &genesis, 3, &MINER);
        extend(&mut chain, &main[0], 1, &[0x33; 20]);
        (chain.tip(), chain.get_utxo_set().to_sorted_entries())
    };

    let store = SledStore::open(&path).unwrap();
    let chain = Blockchain::open(Box::new(store), params()).unwrap();
    assert_eq!(chain.tip(), tip);
    assert_eq!(chain.best_height(), 3);
    assert_eq!(chain.get_utxo_set().to_sorted_entries(), entries);
}
