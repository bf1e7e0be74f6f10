use crate::config::ConsensusParams;
use crate::core::{Hash256, ProofOfWork};
use log::info;
use num_bigint::BigUint;

/// Retargeting rule: every `retarget_interval` heights the parent's target is
/// scaled by actual/expected time of the last window, clamped so one step
/// never moves it by more than `max_adjustment_factor`, and never past the
/// proof-of-work limit. In between the parent's target is inherited.
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Whether the block at `height` starts a new window
    pub fn is_adjustment_height(height: u64, params: &ConsensusParams) -> bool {
        height > 0 && height % params.retarget_interval == 0
    }

    /// Height of the block whose timestamp opens the window ending at the
    /// parent of `height`. The window spans `retarget_interval` block gaps,
    /// fewer only when it would reach past genesis.
    pub fn window_start_height(height: u64, params: &ConsensusParams) -> u64 {
        height.saturating_sub(params.retarget_interval.saturating_add(1))
    }

    /// New target given the parent's target and the timestamps bounding the
    /// last window, which covers `gaps` block intervals
    pub fn calculate_next_target(
        parent_target: &Hash256,
        window_start_timestamp: i64,
        parent_timestamp: i64,
        gaps: u64,
        params: &ConsensusParams,
    ) -> Hash256 {
        if gaps == 0 {
            return *parent_target;
        }
        let expected = gaps.saturating_mul(params.target_block_time_ms).max(1);
        let factor = params.max_adjustment_factor.max(1);
        let actual = parent_timestamp.saturating_sub(window_start_timestamp).max(0) as u64;
        let clamped = actual.clamp((expected / factor).max(1), expected.saturating_mul(factor));

        let old = ProofOfWork::target_to_biguint(parent_target);
        let mut new = old * BigUint::from(clamped) / BigUint::from(expected);

        let limit = ProofOfWork::target_to_biguint(&params.pow_limit);
        if new > limit {
            new = limit;
        }
        if new == BigUint::from(0u8) {
            new = BigUint::from(1u8);
        }

        let next = ProofOfWork::biguint_to_target(&new);
        info!("Difficulty adjustment: window took {actual}ms (expected {expected}ms), target {parent_target} -> {next}");
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConsensusParams {
        ConsensusParams {
            retarget_interval: 10,
            target_block_time_ms: 1_000,
            max_adjustment_factor: 4,
            ..ConsensusParams::default()
        }
    }

    // pow_limit / 16, leaves room to move both ways
    fn start_target(params: &ConsensusParams) -> Hash256 {
        let limit = ProofOfWork::target_to_biguint(&params.pow_limit);
        ProofOfWork::biguint_to_target(&(limit / 16u32))
    }

    fn as_int(target: &Hash256) -> BigUint {
        ProofOfWork::target_to_biguint(target)
    }

    #[test]
    fn test_adjustment_heights() {
        let params = params();
        assert!(!DifficultyAdjustment::is_adjustment_height(0, &params));
        assert!(!DifficultyAdjustment::is_adjustment_height(9, &params));
        assert!(DifficultyAdjustment::is_adjustment_height(10, &params));
        assert!(DifficultyAdjustment::is_adjustment_height(20, &params));
        assert_eq!(DifficultyAdjustment::window_start_height(20, &params), 9);
        // the first window is cut short by genesis
        assert_eq!(DifficultyAdjustment::window_start_height(10, &params), 0);
    }

    #[test]
    fn test_fast_blocks_make_it_harder() {
        let params = params();
        let old = start_target(&params);
        // window took half the expected 10s
        let new = DifficultyAdjustment::calculate_next_target(&old, 0, 5_000, 10, &params);
        assert_eq!(as_int(&new), as_int(&old) / 2u32);
    }

    #[test]
    fn test_slow_blocks_make_it_easier() {
        let params = params();
        let old = start_target(&params);
        let new = DifficultyAdjustment::calculate_next_target(&old, 0, 20_000, 10, &params);
        assert_eq!(as_int(&new), as_int(&old) * 2u32);
    }

    #[test]
    fn test_on_time_blocks_keep_target() {
        let params = params();
        let old = start_target(&params);
        let new = DifficultyAdjustment::calculate_next_target(&old, 0, 10_000, 10, &params);
        assert_eq!(new, old);
    }

    #[test]
    fn test_adjustment_is_clamped() {
        let params = params();
        let old = start_target(&params);

        let fastest = DifficultyAdjustment::calculate_next_target(&old, 0, 1, 10, &params);
        assert_eq!(as_int(&fastest), as_int(&old) / 4u32);

        // timestamps going backwards count as the fastest possible window
        let backwards = DifficultyAdjustment::calculate_next_target(&old, 5_000, 0, 10, &params);
        assert_eq!(backwards, fastest);

        let slowest = DifficultyAdjustment::calculate_next_target(&old, 0, 1_000_000, 10, &params);
        assert_eq!(as_int(&slowest), as_int(&old) * 4u32);
    }

    #[test]
    fn test_never_easier_than_pow_limit() {
        let params = params();
        let new =
            DifficultyAdjustment::calculate_next_target(&params.pow_limit, 0, 1_000_000, 10, &params);
        assert_eq!(new, params.pow_limit);
    }

    #[test]
    fn test_empty_window_keeps_target() {
        let params = params();
        let old = start_target(&params);
        let new = DifficultyAdjustment::calculate_next_target(&old, 0, 0, 0, &params);
        assert_eq!(new, old);
    }
}
