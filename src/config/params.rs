use crate::core::monetary::{HALVING_INTERVAL, INITIAL_BLOCK_REWARD};
use crate::core::Hash256;
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

// Default proof-of-work limit: 16 leading zero bits
const DEFAULT_POW_LIMIT: [u8; 32] = {
    let mut bytes = [0xffu8; 32];
    bytes[0] = 0;
    bytes[1] = 0;
    bytes
};

// Local test networks: any hash below 2^255 wins, about every second try
const REGTEST_POW_LIMIT: [u8; 32] = {
    let mut bytes = [0xffu8; 32];
    bytes[0] = 0x7f;
    bytes
};

/// Rules every node on one network has to agree on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Easiest allowed target, also the genesis target
    pub pow_limit: Hash256,
    /// Heights between two difficulty adjustments
    pub retarget_interval: u64,
    pub target_block_time_ms: u64,
    /// A single adjustment moves the target by at most this factor
    pub max_adjustment_factor: u64,
    pub initial_block_reward: u64,
    pub halving_interval: u64,
    /// How far ahead of the local clock a block timestamp may be
    pub max_future_drift_ms: i64,
    /// Including the coinbase
    pub max_block_transactions: usize,
    pub genesis_timestamp: i64,
    pub max_orphan_blocks: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            pow_limit: Hash256::from_bytes(DEFAULT_POW_LIMIT),
            retarget_interval: 10,
            target_block_time_ms: 60_000,
            max_adjustment_factor: 4,
            initial_block_reward: INITIAL_BLOCK_REWARD,
            halving_interval: HALVING_INTERVAL,
            max_future_drift_ms: 2 * 60 * 1000,
            max_block_transactions: 1_000,
            genesis_timestamp: 1_700_000_000_000,
            max_orphan_blocks: 100,
        }
    }
}

impl ConsensusParams {
    /// Near-trivial proof-of-work for local networks and tests
    pub fn regtest() -> Self {
        ConsensusParams {
            pow_limit: Hash256::from_bytes(REGTEST_POW_LIMIT),
            retarget_interval: 1_000,
            target_block_time_ms: 1_000,
            ..ConsensusParams::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pow_limit.is_zero() {
            return Err(BlockchainError::Config(
                "pow_limit must be non-zero".to_string(),
            ));
        }
        if self.retarget_interval == 0 || self.target_block_time_ms == 0 {
            return Err(BlockchainError::Config(
                "retarget_interval and target_block_time_ms must be positive".to_string(),
            ));
        }
        if self.max_adjustment_factor == 0 {
            return Err(BlockchainError::Config(
                "max_adjustment_factor must be at least 1".to_string(),
            ));
        }
        if self.max_block_transactions == 0 {
            return Err(BlockchainError::Config(
                "max_block_transactions must allow the coinbase".to_string(),
            ));
        }
        if self.max_future_drift_ms < 0 {
            return Err(BlockchainError::Config(
                "max_future_drift_ms cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        ConsensusParams::default().validate().unwrap();
        ConsensusParams::regtest().validate().unwrap();
        assert!(ConsensusParams::regtest().pow_limit > ConsensusParams::default().pow_limit);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let params = ConsensusParams {
            retarget_interval: 0,
            ..ConsensusParams::default()
        };
        assert!(matches!(params.validate(), Err(BlockchainError::Config(_))));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let params: ConsensusParams = toml::from_str("retarget_interval = 5").unwrap();
        assert_eq!(params.retarget_interval, 5);
        assert_eq!(params.max_adjustment_factor, 4);
        assert_eq!(params.pow_limit, ConsensusParams::default().pow_limit);
    }
}
