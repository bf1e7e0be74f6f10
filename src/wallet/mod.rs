//! Wallet side of the ledger
//!
//! Key pairs, address encoding and transaction signing. Nothing here is
//! persisted; the node only needs addresses to pay rewards to.

#[allow(clippy::module_inception)]
pub mod wallet;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
