//! Consensus checks
//!
//! Pure functions: they look at a transaction or block plus a read-only view
//! of the state it builds on, and either accept it or say why not. Nothing
//! here mutates shared state.

use crate::config::ConsensusParams;
use crate::core::monetary::{block_reward, is_valid_amount, MAX_MONEY};
use crate::core::{Block, Hash256, OutPoint, ProofOfWork, Transaction};
use crate::error::{BlockError, TxError};
use crate::storage::{UtxoOverlay, UtxoView};
use crate::utils::ecdsa_p256_sha256_sign_verify;
use crate::wallet::hash_pub_key;
use num_bigint::BigUint;
use std::collections::{HashMap, HashSet};

pub const MAX_TX_INPUTS: usize = 1_000;
pub const MAX_TX_OUTPUTS: usize = 1_000;
pub const MAX_EXTRA_SIZE: usize = 256;
pub const PUB_KEY_HASH_LEN: usize = 20;

/// A transaction that passed `validate_transaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTx {
    pub txid: Hash256,
    pub input_value: u64,
    pub fee: u64,
}

/// A block that passed `validate_block`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBlock {
    pub hash: Hash256,
    pub fees: u64,
    pub work: BigUint,
}

/// What a block is checked against: its parent and the UTXO set as of that
/// parent
pub struct ParentState<'a> {
    pub hash: Hash256,
    pub height: u64,
    pub timestamp: i64,
    /// Target the child must carry
    pub next_target: Hash256,
    pub utxo: &'a dyn UtxoView,
}

fn check_outputs(tx: &Transaction) -> Result<(), TxError> {
    if tx.get_vout().len() > MAX_TX_OUTPUTS {
        return Err(TxError::MalformedTransaction(format!(
            "{} outputs exceed the limit of {MAX_TX_OUTPUTS}",
            tx.get_vout().len()
        )));
    }
    for (index, output) in tx.get_vout().iter().enumerate() {
        if !is_valid_amount(output.get_value()) {
            return Err(TxError::MalformedTransaction(format!(
                "output {index} value {} is outside 1..={MAX_MONEY}",
                output.get_value()
            )));
        }
        if output.get_pub_key_hash().len() != PUB_KEY_HASH_LEN {
            return Err(TxError::MalformedTransaction(format!(
                "output {index} owner is not a {PUB_KEY_HASH_LEN} byte key hash"
            )));
        }
    }
    match tx.output_value() {
        Some(total) if total <= MAX_MONEY => {}
        _ => {
            return Err(TxError::MalformedTransaction(
                "total output value exceeds the money supply".to_string(),
            ))
        }
    }
    if tx.get_extra().len() > MAX_EXTRA_SIZE {
        return Err(TxError::MalformedTransaction(format!(
            "extra data exceeds {MAX_EXTRA_SIZE} bytes"
        )));
    }
    Ok(())
}

/// Context-free shape checks for a non-coinbase transaction
pub fn check_transaction_structure(tx: &Transaction) -> Result<(), TxError> {
    if tx.get_vin().is_empty() {
        return Err(TxError::MalformedTransaction(
            "transaction has no inputs".to_string(),
        ));
    }
    if tx.get_vin().len() > MAX_TX_INPUTS {
        return Err(TxError::MalformedTransaction(format!(
            "{} inputs exceed the limit of {MAX_TX_INPUTS}",
            tx.get_vin().len()
        )));
    }
    if tx.get_vout().is_empty() {
        return Err(TxError::MalformedTransaction(
            "transaction has no outputs".to_string(),
        ));
    }
    check_outputs(tx)
}

/// Checks a spending transaction against `view`.
///
/// Order matters: shape first (without looking at the view), then duplicate
/// inputs, then that every input exists, then ownership, then value.
pub fn validate_transaction(tx: &Transaction, view: &dyn UtxoView) -> Result<ValidatedTx, TxError> {
    check_transaction_structure(tx)?;

    let mut seen = HashSet::new();
    for input in tx.get_vin() {
        if !seen.insert(*input.get_prev()) {
            return Err(TxError::DoubleSpendWithinTx {
                outpoint: *input.get_prev(),
            });
        }
    }

    let mut resolved = Vec::with_capacity(tx.get_vin().len());
    for input in tx.get_vin() {
        let output = view
            .get_output(input.get_prev())
            .ok_or(TxError::MissingInput {
                outpoint: *input.get_prev(),
            })?;
        resolved.push(output);
    }

    let txid = tx.id();
    for (index, (input, output)) in tx.get_vin().iter().zip(&resolved).enumerate() {
        let owner_matches = hash_pub_key(input.get_pub_key()).as_slice() == output.get_pub_key_hash();
        if !owner_matches
            || !ecdsa_p256_sha256_sign_verify(input.get_pub_key(), input.get_signature(), txid.as_bytes())
        {
            return Err(TxError::InvalidSignature { input: index });
        }
    }

    // Every resolved output is at most MAX_MONEY, so the sum cannot overflow
    // for any realistic input count. Saturate anyway.
    let input_value = resolved
        .iter()
        .fold(0u64, |acc, out| acc.saturating_add(out.get_value()));
    let output_value = tx.output_value().unwrap_or(u64::MAX);
    if input_value < output_value {
        return Err(TxError::InsufficientInputValue {
            inputs: input_value,
            outputs: output_value,
        });
    }

    Ok(ValidatedTx {
        txid,
        input_value,
        fee: input_value - output_value,
    })
}

/// Checks that need nothing but the block itself. Orphans go through this
/// before they are cached.
pub fn check_block_sanity(block: &Block, params: &ConsensusParams) -> Result<(), BlockError> {
    let transactions = block.get_transactions();
    if transactions.is_empty() {
        return Err(BlockError::MalformedBlock(
            "block has no transactions".to_string(),
        ));
    }
    if transactions.len() > params.max_block_transactions {
        return Err(BlockError::MalformedBlock(format!(
            "{} transactions exceed the limit of {}",
            transactions.len(),
            params.max_block_transactions
        )));
    }
    // the merkle tree repeats an odd last leaf, so a repeated transaction
    // would leave the root unchanged
    let mut ids = HashSet::new();
    if let Some(tx) = transactions.iter().find(|tx| !ids.insert(tx.id())) {
        return Err(BlockError::MalformedBlock(format!(
            "transaction {} appears twice",
            tx.id()
        )));
    }
    if !block.verify_merkle_root() {
        return Err(BlockError::MalformedBlock(
            "merkle root does not match the transactions".to_string(),
        ));
    }
    if block.get_target() > params.pow_limit {
        return Err(BlockError::InvalidHeader(format!(
            "target {} is easier than the proof-of-work limit",
            block.get_target()
        )));
    }
    if !ProofOfWork::validate(block.get_header()) {
        return Err(BlockError::InsufficientWork { hash: block.hash() });
    }
    Ok(())
}

fn check_coinbase_form(block: &Block) -> Result<(), BlockError> {
    let transactions = block.get_transactions();
    let coinbase = &transactions[0];
    if !coinbase.is_coinbase() {
        return Err(BlockError::InvalidCoinbase(
            "first transaction has inputs".to_string(),
        ));
    }
    if let Some(index) = transactions.iter().skip(1).position(Transaction::is_coinbase) {
        return Err(BlockError::InvalidCoinbase(format!(
            "transaction {} is a second coinbase",
            index + 1
        )));
    }
    if coinbase.coinbase_height() != Some(block.get_height()) {
        return Err(BlockError::InvalidCoinbase(format!(
            "coinbase does not commit to height {}",
            block.get_height()
        )));
    }
    check_outputs(coinbase).map_err(|e| BlockError::InvalidCoinbase(e.to_string()))
}

/// Full validation of `block` on top of `parent`.
///
/// `parent` is `None` when the previous block is unknown; that is reported
/// as `OrphanBlock` so the caller can park the block until the parent shows
/// up.
pub fn validate_block(
    block: &Block,
    parent: Option<&ParentState<'_>>,
    params: &ConsensusParams,
    now: i64,
) -> Result<ValidatedBlock, BlockError> {
    let parent = parent.ok_or(BlockError::OrphanBlock {
        missing_parent: block.get_pre_block_hash(),
    })?;
    if parent.hash != block.get_pre_block_hash() {
        return Err(BlockError::InvalidHeader(format!(
            "previous hash {} does not name parent {}",
            block.get_pre_block_hash(),
            parent.hash
        )));
    }

    check_block_sanity(block, params)?;

    if block.get_height() != parent.height + 1 {
        return Err(BlockError::InvalidHeader(format!(
            "height {} does not follow parent height {}",
            block.get_height(),
            parent.height
        )));
    }
    if block.get_target() != parent.next_target {
        return Err(BlockError::InvalidHeader(format!(
            "target {} differs from required {}",
            block.get_target(),
            parent.next_target
        )));
    }

    if block.get_timestamp() < parent.timestamp {
        return Err(BlockError::InvalidTimestamp(format!(
            "{} is before parent timestamp {}",
            block.get_timestamp(),
            parent.timestamp
        )));
    }
    if block.get_timestamp() > now.saturating_add(params.max_future_drift_ms) {
        return Err(BlockError::InvalidTimestamp(format!(
            "{} is too far in the future (now {now})",
            block.get_timestamp()
        )));
    }

    check_coinbase_form(block)?;

    let transactions = block.get_transactions();
    let mut overlay = UtxoOverlay::new(parent.utxo);
    overlay.apply(&transactions[0]);
    let mut spent_by: HashMap<OutPoint, usize> = HashMap::new();
    let mut fees: u64 = 0;

    for (index, tx) in transactions.iter().enumerate().skip(1) {
        for input in tx.get_vin() {
            if spent_by.contains_key(input.get_prev()) {
                return Err(BlockError::DoubleSpendInBlock {
                    outpoint: *input.get_prev(),
                    index,
                });
            }
        }

        let validated = validate_transaction(tx, &overlay)
            .map_err(|cause| BlockError::InvalidTransaction { index, cause })?;

        if tx.outpoints().any(|outpoint| overlay.get_output(&outpoint).is_some()) {
            return Err(BlockError::InvalidTransaction {
                index,
                cause: TxError::MalformedTransaction(format!(
                    "transaction {} duplicates unspent outputs",
                    validated.txid
                )),
            });
        }

        for input in tx.get_vin() {
            spent_by.insert(*input.get_prev(), index);
        }
        overlay.apply(tx);
        fees = fees.saturating_add(validated.fee);
    }

    let allowed = block_reward(block.get_height(), params).saturating_add(fees);
    let claimed = transactions[0].output_value().unwrap_or(u64::MAX);
    if claimed > allowed {
        return Err(BlockError::InvalidCoinbase(format!(
            "coinbase claims {claimed}, at most {allowed} allowed"
        )));
    }

    Ok(ValidatedBlock {
        hash: block.hash(),
        fees,
        work: ProofOfWork::work(&block.get_target()),
    })
}
