use crate::core::{Hash256, Transaction};

/// Merkle root over transaction ids, Bitcoin style: leaves are the ids, each
/// level hashes adjacent pairs with double SHA-256 and an odd last node is
/// paired with itself.
pub struct MerkleTree;

impl MerkleTree {
    pub fn calculate_merkle_root(leaves: &[Hash256]) -> Hash256 {
        if leaves.is_empty() {
            return Hash256::digest(&[]);
        }

        let mut level: Vec<Hash256> = leaves.to_vec();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let left = pair[0];
                    let right = pair.get(1).copied().unwrap_or(left);
                    Self::hash_pair(&left, &right)
                })
                .collect();
        }
        level[0]
    }

    pub fn from_transactions(transactions: &[Transaction]) -> Hash256 {
        let ids: Vec<Hash256> = transactions.iter().map(Transaction::id).collect();
        Self::calculate_merkle_root(&ids)
    }

    fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(left.as_bytes());
        data.extend_from_slice(right.as_bytes());
        Hash256::digest(&data)
    }
}
