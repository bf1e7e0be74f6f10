//! Monetary rules
//!
//! Amounts are plain integers of the smallest unit. The block reward starts
//! at 50 and halves every `halving_interval` blocks, which keeps total
//! issuance under `MAX_MONEY`.

use crate::config::ConsensusParams;

/// Reward paid to the first block after genesis
pub const INITIAL_BLOCK_REWARD: u64 = 50;

/// Blocks between reward halvings
pub const HALVING_INTERVAL: u64 = 210_000;

/// No single output and no transaction total may exceed this
pub const MAX_MONEY: u64 = 21_000_000;

/// Subsidy a coinbase may claim at `height` (fees come on top)
pub fn block_reward(height: u64, params: &ConsensusParams) -> u64 {
    if params.halving_interval == 0 {
        return params.initial_block_reward;
    }
    let halvings = height / params.halving_interval;
    if halvings >= 64 {
        return 0;
    }
    params.initial_block_reward >> halvings
}

pub fn is_valid_amount(value: u64) -> bool {
    (1..=MAX_MONEY).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_halves() {
        let params = ConsensusParams::default();
        assert_eq!(block_reward(1, &params), INITIAL_BLOCK_REWARD);
        assert_eq!(block_reward(HALVING_INTERVAL - 1, &params), 50);
        assert_eq!(block_reward(HALVING_INTERVAL, &params), 25);
        assert_eq!(block_reward(HALVING_INTERVAL * 3, &params), 6);
        assert_eq!(block_reward(HALVING_INTERVAL * 64, &params), 0);
    }

    #[test]
    fn test_total_issuance_fits_max_money() {
        let params = ConsensusParams::default();
        let mut total = 0u64;
        let mut era = 0;
        loop {
            let reward = block_reward(era * HALVING_INTERVAL, &params);
            if reward == 0 {
                break;
            }
            total += reward * HALVING_INTERVAL;
            era += 1;
        }
        assert!(total <= MAX_MONEY);
    }

    #[test]
    fn test_amount_bounds() {
        assert!(!is_valid_amount(0));
        assert!(is_valid_amount(1));
        assert!(is_valid_amount(MAX_MONEY));
        assert!(!is_valid_amount(MAX_MONEY + 1));
    }
}
