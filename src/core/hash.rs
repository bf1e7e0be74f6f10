use crate::error::{BlockchainError, Result};
use crate::utils::hash256_digest;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 32 byte double SHA-256 digest.
///
/// Ordering compares the bytes left to right, which is the same as comparing
/// the digests as big-endian 256-bit integers. Proof-of-work checks rely on
/// that.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, bincode::Encode, bincode::Decode)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// All zero bytes; also the previous-hash sentinel of the genesis block
    pub const fn zero() -> Hash256 {
        Hash256([0u8; 32])
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Hash256 {
        Hash256(bytes)
    }

    pub fn digest(data: &[u8]) -> Hash256 {
        Hash256(hash256_digest(data))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Hash256> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            BlockchainError::Serialization(format!("Expected 32 hash bytes, got {}", bytes.len()))
        })?;
        Ok(Hash256(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Hash256> {
        let bytes = HEXLOWER
            .decode(s.to_ascii_lowercase().as_bytes())
            .map_err(|e| BlockchainError::Serialization(format!("Invalid hash hex {s}: {e}")))?;
        Hash256::from_slice(&bytes)
    }
}

// Text formats (JSON wire messages, TOML config) carry hashes as lowercase hex.
impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_str(&s).map_err(serde::de::Error::custom)
    }
}
