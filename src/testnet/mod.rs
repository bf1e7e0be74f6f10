//! Helpers for unit tests: regtest parameters, hand-mined blocks and signed
//! spends

pub mod test_utils;

pub use test_utils::*;
