use crate::core::{BlockHeader, Hash256};
use log::{debug, info};
use num_bigint::BigUint;
use once_cell::sync::Lazy;

/// 2^256, the size of the hash space
static HASH_SPACE: Lazy<BigUint> = Lazy::new(|| BigUint::from(1u8) << 256usize);

/// How many nonces are tried between two looks at the stop flag
const STOP_CHECK_INTERVAL: u64 = 4096;

pub struct ProofOfWork;

impl ProofOfWork {
    pub fn target_to_biguint(target: &Hash256) -> BigUint {
        BigUint::from_bytes_be(target.as_bytes())
    }

    /// Converts back to the 32 byte form, saturating at the all-ones target
    pub fn biguint_to_target(value: &BigUint) -> Hash256 {
        let bytes = value.to_bytes_be();
        if bytes.len() > 32 {
            return Hash256::from_bytes([0xff; 32]);
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Hash256::from_bytes(out)
    }

    pub fn meets_target(hash: &Hash256, target: &Hash256) -> bool {
        hash <= target
    }

    /// A header is valid when its hash, read as a number, is at most its target
    pub fn validate(header: &BlockHeader) -> bool {
        Self::meets_target(&header.hash(), &header.target)
    }

    /// Expected number of hashes to hit `target`: 2^256 / (target + 1)
    pub fn work(target: &Hash256) -> BigUint {
        let denominator = Self::target_to_biguint(target) + 1u32;
        &*HASH_SPACE / denominator
    }

    /// Searches for a nonce meeting the header's own target, starting from a
    /// random one. Returns `false` if `should_stop` asked to give up first or
    /// the nonce space ran out.
    pub fn mine(header: &mut BlockHeader, should_stop: &dyn Fn() -> bool) -> bool {
        let start: u64 = rand::random();
        let mut nonce = start;
        let mut tries: u64 = 0;
        loop {
            header.nonce = nonce;
            if Self::validate(header) {
                info!(
                    "Found nonce {nonce} for block at height {} after {tries} attempts",
                    header.height
                );
                return true;
            }
            tries += 1;
            if tries % STOP_CHECK_INTERVAL == 0 && should_stop() {
                debug!("Mining at height {} cancelled", header.height);
                return false;
            }
            nonce = nonce.wrapping_add(1);
            if nonce == start {
                return false;
            }
        }
    }
}
