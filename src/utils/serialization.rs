// bincode layer for everything the node writes to disk (blocks, UTXO snapshots).
// Hash preimages do not go through here: they are laid out by hand so the
// digest never depends on the encoder's configuration.
use crate::error::{BlockchainError, Result};
use bincode::config::{self, Configuration, Limit};
use serde::{Deserialize, Serialize};

/// Upper bound for a single stored record. Blocks are small, snapshots of a
/// toy chain stay well below this.
const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

fn storage_config() -> Configuration<config::LittleEndian, config::Varint, Limit<MAX_RECORD_SIZE>> {
    config::standard().with_limit::<MAX_RECORD_SIZE>()
}

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, storage_config())
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (data, read) = bincode::decode_from_slice(bytes, storage_config())
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(BlockchainError::Serialization(format!(
            "Trailing bytes after record: {} unread",
            bytes.len() - read
        )));
    }
    Ok(data)
}
