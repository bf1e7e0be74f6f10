use crate::core::validation::{check_transaction_structure, validate_transaction};
use crate::core::{Block, ChainUpdate, Hash256, OutPoint, TXOutput, Transaction};
use crate::error::TxError;
use crate::storage::{UTXOSet, UtxoView};
use log::{debug, info};
use std::collections::{HashMap, HashSet};

struct PoolEntry {
    tx: Transaction,
    fee: u64,
}

/// Pending transactions, valid against the UTXO set plus the outputs of the
/// pool transactions admitted before them.
///
/// Conflicts are never replaced: the first valid spender of an outpoint
/// keeps it until a block confirms or invalidates it.
#[derive(Default)]
pub struct MemoryPool {
    entries: HashMap<Hash256, PoolEntry>,
    // admission order; parents always come before children
    order: Vec<Hash256>,
    // outpoint -> pool transaction spending it
    spent: HashMap<OutPoint, Hash256>,
}

/// UTXO set seen through the pool: pool outputs are spendable, outputs
/// spent by the pool are not
struct PoolView<'a> {
    utxo: &'a UTXOSet,
    pool: &'a MemoryPool,
}

impl UtxoView for PoolView<'_> {
    fn get_output(&self, outpoint: &OutPoint) -> Option<TXOutput> {
        if self.pool.spent.contains_key(outpoint) {
            return None;
        }
        if let Some(output) = self.utxo.get(outpoint) {
            return Some(output.clone());
        }
        self.pool
            .entries
            .get(&outpoint.txid)
            .and_then(|entry| entry.tx.get_vout().get(outpoint.vout as usize))
            .cloned()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool::default()
    }

    /// Validates `tx` against the UTXO set and the pool and admits it
    pub fn submit(&mut self, tx: Transaction, utxo: &UTXOSet) -> Result<Hash256, TxError> {
        if tx.is_coinbase() {
            return Err(TxError::MalformedTransaction(
                "coinbase transactions are only valid inside blocks".to_string(),
            ));
        }
        check_transaction_structure(&tx)?;
        let txid = tx.id();
        if self.entries.contains_key(&txid) {
            return Err(TxError::AlreadyInPool { txid });
        }
        for input in tx.get_vin() {
            if let Some(existing) = self.spent.get(input.get_prev()) {
                return Err(TxError::MempoolConflict {
                    outpoint: *input.get_prev(),
                    existing: *existing,
                });
            }
        }

        let view = PoolView { utxo, pool: self };
        let validated = validate_transaction(&tx, &view)?;

        for input in tx.get_vin() {
            self.spent.insert(*input.get_prev(), txid);
        }
        self.order.push(txid);
        self.entries.insert(
            txid,
            PoolEntry {
                tx,
                fee: validated.fee,
            },
        );
        info!("Accepted transaction {txid} into the mempool (fee {})", validated.fee);
        Ok(txid)
    }

    /// Up to `max_count` transactions in admission order. A child is never
    /// returned without its in-pool parents since those were admitted first.
    pub fn select_for_block(&self, max_count: usize) -> Vec<Transaction> {
        let mut selected: Vec<Transaction> = vec![];
        let mut included: HashSet<Hash256> = HashSet::new();
        for txid in &self.order {
            if selected.len() >= max_count {
                break;
            }
            let Some(entry) = self.entries.get(txid) else {
                continue;
            };
            let parents_ready = entry.tx.get_vin().iter().all(|input| {
                let parent = input.get_prev().txid;
                !self.entries.contains_key(&parent) || included.contains(&parent)
            });
            if parents_ready {
                included.insert(*txid);
                selected.push(entry.tx.clone());
            }
        }
        selected
    }

    /// Drops transactions confirmed by `block`, transactions spending an
    /// outpoint the block spent, and everything descending from those
    /// conflicts.
    pub fn remove_for_block(&mut self, block: &Block) {
        let mut doomed: Vec<Hash256> = vec![];
        for tx in block.get_transactions() {
            let txid = tx.id();
            if self.entries.contains_key(&txid) {
                self.remove_entry(&txid);
                continue;
            }
            for input in tx.get_vin() {
                if let Some(conflict) = self.spent.get(input.get_prev()) {
                    doomed.push(*conflict);
                }
            }
        }

        while let Some(txid) = doomed.pop() {
            let Some(entry) = self.remove_entry(&txid) else {
                continue;
            };
            debug!("Evicted conflicting transaction {txid}");
            for outpoint in entry.tx.outpoints() {
                if let Some(child) = self.spent.get(&outpoint) {
                    doomed.push(*child);
                }
            }
        }
    }

    /// Rebuilds the pool after a reorganization: transactions from the
    /// disconnected blocks (oldest first) are offered again, followed by what
    /// was already pending. Anything the new chain confirmed or invalidated
    /// is silently dropped.
    pub fn readmit_after_reorg(&mut self, disconnected: &[Block], utxo: &UTXOSet) {
        let pending: Vec<Transaction> = self
            .order
            .iter()
            .filter_map(|txid| self.entries.get(txid).map(|entry| entry.tx.clone()))
            .collect();
        self.clear();

        let returning = disconnected
            .iter()
            .flat_map(|block| block.get_transactions().iter())
            .filter(|tx| !tx.is_coinbase())
            .cloned();

        let mut readmitted = 0;
        for tx in returning.chain(pending) {
            let txid = tx.id();
            match self.submit(tx, utxo) {
                Ok(_) => readmitted += 1,
                Err(e) => debug!("Dropped {txid} after reorganization: {e}"),
            }
        }
        info!("Mempool holds {readmitted} transactions after reorganization");
    }

    /// Brings the pool in line with a change of the active chain. `utxo` is
    /// the set as of the new tip.
    pub fn on_chain_update(&mut self, update: &ChainUpdate, utxo: &UTXOSet) {
        if update.is_reorganization() {
            self.readmit_after_reorg(&update.disconnected, utxo);
        } else {
            for block in &update.connected {
                self.remove_for_block(block);
            }
        }
    }

    fn remove_entry(&mut self, txid: &Hash256) -> Option<PoolEntry> {
        let entry = self.entries.remove(txid)?;
        for input in entry.tx.get_vin() {
            if self.spent.get(input.get_prev()) == Some(txid) {
                self.spent.remove(input.get_prev());
            }
        }
        self.order.retain(|id| id != txid);
        Some(entry)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&Transaction> {
        self.entries.get(txid).map(|entry| &entry.tx)
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    /// Whether a pending transaction already spends `outpoint`
    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        self.spent.contains_key(outpoint)
    }

    pub fn fee_of(&self, txid: &Hash256) -> Option<u64> {
        self.entries.get(txid).map(|entry| entry.fee)
    }

    pub fn total_fees(&self) -> u64 {
        self.entries.values().map(|entry| entry.fee).sum()
    }

    /// Pending transactions in admission order
    pub fn get_all(&self) -> Vec<Transaction> {
        self.select_for_block(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.spent.clear();
    }
}
