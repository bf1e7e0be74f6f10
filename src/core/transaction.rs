// Transactions follow the UTXO model: every input consumes an output created
// by an earlier transaction, every output can later be consumed exactly once.
// A coinbase is the one transaction per block with no inputs at all.

use crate::core::Hash256;
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::address_to_pub_key_hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes of the coinbase `extra` field taken by the block height
pub const COINBASE_HEIGHT_LEN: usize = 8;

/// Points at output `vout` of transaction `txid`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> OutPoint {
        OutPoint { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

// An input names the output it spends and carries the proof that the owner
// agreed: the public key (which must hash to the output's owner) and a
// signature over the transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    prev: OutPoint,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    // Unsigned input, the wallet fills in the unlocking data afterwards
    pub fn new(prev: OutPoint) -> TXInput {
        TXInput {
            prev,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_prev(&self) -> &OutPoint {
        &self.prev
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn set_unlock(&mut self, pub_key: Vec<u8>, signature: Vec<u8>) {
        self.pub_key = pub_key;
        self.signature = signature;
    }
}

// An output is an amount locked to the RIPEMD160(SHA256(pubkey)) of its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, pub_key_hash: Vec<u8>) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash,
        }
    }

    /// Output paying `value` to a base58 address
    pub fn to_address(value: u64, address: &str) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::InvalidAddress(
                "Output value must be positive".to_string(),
            ));
        }
        Ok(TXOutput::new(value, address_to_pub_key_hash(address)?))
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
    // Free-form data. For a coinbase it starts with the block height.
    extra: Vec<u8>,
}

impl Transaction {
    pub fn new(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Transaction {
        Transaction {
            vin,
            vout,
            extra: vec![],
        }
    }

    /// Reward transaction for the block at `height`. `tag` is appended after
    /// the height so miners can make their coinbase ids distinct.
    pub fn new_coinbase(height: u64, vout: Vec<TXOutput>, tag: &[u8]) -> Transaction {
        let mut extra = height.to_be_bytes().to_vec();
        extra.extend_from_slice(tag);
        Transaction {
            vin: vec![],
            vout,
            extra,
        }
    }

    /// Double SHA-256 of the canonical encoding. Signatures and public keys
    /// are left out, so signing does not change the id.
    pub fn id(&self) -> Hash256 {
        Hash256::digest(&self.id_preimage())
    }

    fn id_preimage(&self) -> Vec<u8> {
        let mut data = vec![];
        data.extend((self.vin.len() as u32).to_be_bytes());
        for input in &self.vin {
            data.extend(input.prev.txid.as_bytes());
            data.extend(input.prev.vout.to_be_bytes());
        }
        data.extend((self.vout.len() as u32).to_be_bytes());
        for output in &self.vout {
            data.extend(output.value.to_be_bytes());
            data.extend((output.pub_key_hash.len() as u32).to_be_bytes());
            data.extend(output.pub_key_hash.as_slice());
        }
        data.extend((self.extra.len() as u32).to_be_bytes());
        data.extend(self.extra.as_slice());
        data
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.is_empty()
    }

    /// Height committed in a coinbase `extra`, if it has one
    pub fn coinbase_height(&self) -> Option<u64> {
        if !self.is_coinbase() || self.extra.len() < COINBASE_HEIGHT_LEN {
            return None;
        }
        let mut height = [0u8; COINBASE_HEIGHT_LEN];
        height.copy_from_slice(&self.extra[..COINBASE_HEIGHT_LEN]);
        Some(u64::from_be_bytes(height))
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vin_mut(&mut self) -> &mut [TXInput] {
        self.vin.as_mut_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_extra(&self) -> &[u8] {
        self.extra.as_slice()
    }

    /// Outpoints this transaction creates, in output order
    pub fn outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        let txid = self.id();
        (0..self.vout.len() as u32).map(move |vout| OutPoint::new(txid, vout))
    }

    /// Sum of output values, `None` on overflow
    pub fn output_value(&self) -> Option<u64> {
        self.vout
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}
