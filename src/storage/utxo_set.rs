use crate::core::{Block, OutPoint, TXOutput, Transaction};
use crate::error::{BlockError, TxError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Read access to spendable outputs. Implemented by the UTXO set itself, by
/// the in-block overlay and by the mempool view.
pub trait UtxoView {
    fn get_output(&self, outpoint: &OutPoint) -> Option<TXOutput>;
}

/// What applying one block changed, enough to undo it later
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockUndo {
    /// Outputs consumed by the block, in the order they were spent
    spent: Vec<(OutPoint, TXOutput)>,
    /// Outputs the block created
    created: Vec<OutPoint>,
}

impl BlockUndo {
    pub fn get_spent(&self) -> &[(OutPoint, TXOutput)] {
        self.spent.as_slice()
    }

    pub fn get_created(&self) -> &[OutPoint] {
        self.created.as_slice()
    }
}

/// Unspent outputs of the active chain. It only changes by applying or
/// rolling back whole blocks, and can always be rebuilt by replaying the
/// active chain from genesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UTXOSet {
    entries: HashMap<OutPoint, TXOutput>,
}

impl UtxoView for UTXOSet {
    fn get_output(&self, outpoint: &OutPoint) -> Option<TXOutput> {
        self.entries.get(outpoint).cloned()
    }
}

impl UTXOSet {
    pub fn new() -> UTXOSet {
        UTXOSet::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (OutPoint, TXOutput)>) -> UTXOSet {
        UTXOSet {
            entries: entries.into_iter().collect(),
        }
    }

    /// Rebuilds the set from scratch by applying `blocks` in order
    pub fn replay<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Result<UTXOSet, BlockError> {
        let mut utxo = UTXOSet::new();
        for block in blocks {
            utxo.apply_block(block)?;
        }
        Ok(utxo)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TXOutput> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TXOutput)> {
        self.entries.iter()
    }

    /// Entries sorted by outpoint, the form written to snapshots
    pub fn to_sorted_entries(&self) -> Vec<(OutPoint, TXOutput)> {
        let mut entries: Vec<(OutPoint, TXOutput)> = self
            .entries
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Outputs locked to `pub_key_hash`, sorted by outpoint
    pub fn find_outputs(&self, pub_key_hash: &[u8]) -> Vec<(OutPoint, TXOutput)> {
        let mut outputs: Vec<(OutPoint, TXOutput)> = self
            .entries
            .iter()
            .filter(|(_, out)| out.is_locked_with_key(pub_key_hash))
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        outputs.sort_by(|a, b| a.0.cmp(&b.0));
        outputs
    }

    pub fn balance(&self, pub_key_hash: &[u8]) -> u64 {
        self.entries
            .values()
            .filter(|out| out.is_locked_with_key(pub_key_hash))
            .map(TXOutput::get_value)
            .sum()
    }

    /// Applies every transaction of `block`. Either the whole block goes in
    /// or, on the first missing input, everything applied so far is undone
    /// and the set is left as it was.
    pub fn apply_block(&mut self, block: &Block) -> Result<BlockUndo, BlockError> {
        let mut undo = BlockUndo::default();
        for (index, tx) in block.get_transactions().iter().enumerate() {
            if let Err(cause) = self.apply_transaction(tx, &mut undo) {
                self.rollback(&undo);
                return Err(BlockError::InvalidTransaction { index, cause });
            }
        }
        Ok(undo)
    }

    /// Reverses `apply_block` using the undo data it returned
    pub fn rollback_block(&mut self, undo: &BlockUndo) {
        self.rollback(undo);
    }

    fn apply_transaction(&mut self, tx: &Transaction, undo: &mut BlockUndo) -> Result<(), TxError> {
        for input in tx.get_vin() {
            let prev = input.get_prev();
            match self.entries.remove(prev) {
                Some(output) => undo.spent.push((*prev, output)),
                None => return Err(TxError::MissingInput { outpoint: *prev }),
            }
        }
        for (outpoint, output) in tx.outpoints().zip(tx.get_vout()) {
            if self.entries.contains_key(&outpoint) {
                return Err(TxError::MalformedTransaction(format!(
                    "output {outpoint} already exists"
                )));
            }
            self.entries.insert(outpoint, output.clone());
            undo.created.push(outpoint);
        }
        Ok(())
    }

    fn rollback(&mut self, undo: &BlockUndo) {
        for outpoint in undo.created.iter().rev() {
            self.entries.remove(outpoint);
        }
        for (outpoint, output) in undo.spent.iter().rev() {
            self.entries.insert(*outpoint, output.clone());
        }
    }
}

/// Copy-on-write view over another view: spends and new outputs are
/// recorded locally, the base is never touched. Used to validate the
/// transactions of one block in sequence.
pub struct UtxoOverlay<'a> {
    base: &'a dyn UtxoView,
    added: HashMap<OutPoint, TXOutput>,
    spent: HashSet<OutPoint>,
}

impl<'a> UtxoOverlay<'a> {
    pub fn new(base: &'a dyn UtxoView) -> UtxoOverlay<'a> {
        UtxoOverlay {
            base,
            added: HashMap::new(),
            spent: HashSet::new(),
        }
    }

    /// Records the effects of an already validated transaction
    pub fn apply(&mut self, tx: &Transaction) {
        for input in tx.get_vin() {
            let prev = *input.get_prev();
            if self.added.remove(&prev).is_none() {
                self.spent.insert(prev);
            }
        }
        for (outpoint, output) in tx.outpoints().zip(tx.get_vout()) {
            self.added.insert(outpoint, output.clone());
        }
    }
}

impl UtxoView for UtxoOverlay<'_> {
    fn get_output(&self, outpoint: &OutPoint) -> Option<TXOutput> {
        if let Some(output) = self.added.get(outpoint) {
            return Some(output.clone());
        }
        if self.spent.contains(outpoint) {
            return None;
        }
        self.base.get_output(outpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Hash256, TXInput};

    fn pkh(n: u8) -> Vec<u8> {
        vec![n; 20]
    }

    fn coinbase_block(height: u64, value: u64, owner: u8) -> Block {
        let coinbase = Transaction::new_coinbase(height, vec![TXOutput::new(value, pkh(owner))], &[]);
        Block::assemble(height, Hash256::zero(), 0, Hash256::zero(), vec![coinbase])
    }

    fn spend(prev: OutPoint, values: &[(u64, u8)]) -> Transaction {
        Transaction::new(
            vec![TXInput::new(prev)],
            values.iter().map(|(v, o)| TXOutput::new(*v, pkh(*o))).collect(),
        )
    }

    #[test]
    fn test_apply_and_rollback_restore_state() {
        let first = coinbase_block(1, 50, 1);
        let mut utxo = UTXOSet::replay([&first]).unwrap();
        let before = utxo.clone();

        let funding = OutPoint::new(first.get_transactions()[0].id(), 0);
        let split = spend(funding, &[(20, 2), (30, 1)]);
        let coinbase = Transaction::new_coinbase(2, vec![TXOutput::new(50, pkh(1))], &[]);
        let second = Block::assemble(2, first.hash(), 0, Hash256::zero(), vec![coinbase, split]);

        let undo = utxo.apply_block(&second).unwrap();
        assert_eq!(utxo.len(), 3);
        assert!(!utxo.contains(&funding));
        assert_eq!(utxo.balance(&pkh(2)), 20);
        assert_eq!(undo.get_spent().len(), 1);
        assert_eq!(undo.get_created().len(), 3);

        utxo.rollback_block(&undo);
        assert_eq!(utxo, before);
    }

    #[test]
    fn test_failed_block_leaves_set_untouched() {
        let first = coinbase_block(1, 50, 1);
        let mut utxo = UTXOSet::replay([&first]).unwrap();
        let before = utxo.clone();

        let funding = OutPoint::new(first.get_transactions()[0].id(), 0);
        let good = spend(funding, &[(50, 2)]);
        let bad = spend(OutPoint::new(Hash256::digest(b"nowhere"), 0), &[(1, 2)]);
        let coinbase = Transaction::new_coinbase(2, vec![], &[]);
        let block = Block::assemble(2, first.hash(), 0, Hash256::zero(), vec![coinbase, good, bad]);

        let err = utxo.apply_block(&block).unwrap_err();
        assert!(matches!(
            err,
            BlockError::InvalidTransaction {
                index: 2,
                cause: TxError::MissingInput { .. }
            }
        ));
        assert_eq!(utxo, before);
    }

    #[test]
    fn test_find_outputs_and_balance() {
        let a = coinbase_block(1, 50, 1);
        let b = coinbase_block(2, 25, 1);
        let c = coinbase_block(3, 10, 2);
        let utxo = UTXOSet::replay([&a, &b, &c]).unwrap();

        assert_eq!(utxo.balance(&pkh(1)), 75);
        assert_eq!(utxo.find_outputs(&pkh(1)).len(), 2);
        assert_eq!(utxo.find_outputs(&pkh(9)), vec![]);
        assert_eq!(utxo.to_sorted_entries().len(), 3);
    }

    #[test]
    fn test_overlay_tracks_spends_without_touching_base() {
        let first = coinbase_block(1, 50, 1);
        let utxo = UTXOSet::replay([&first]).unwrap();
        let funding = OutPoint::new(first.get_transactions()[0].id(), 0);

        let split = spend(funding, &[(20, 2), (30, 1)]);
        let mut overlay = UtxoOverlay::new(&utxo);
        overlay.apply(&split);

        assert!(overlay.get_output(&funding).is_none());
        assert_eq!(
            overlay.get_output(&OutPoint::new(split.id(), 1)).map(|o| o.get_value()),
            Some(30)
        );

        // spending a freshly added output removes it again
        let change = spend(OutPoint::new(split.id(), 1), &[(30, 3)]);
        overlay.apply(&change);
        assert!(overlay.get_output(&OutPoint::new(split.id(), 1)).is_none());

        assert!(utxo.contains(&funding));
        assert_eq!(utxo.len(), 1);
    }
}
