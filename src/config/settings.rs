use crate::config::ConsensusParams;
use crate::error::{BlockchainError, Result};
use crate::wallet::validate_address;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
const NODE_PEERS_KEY: &str = "NODE_PEERS";
const DATA_DIR_KEY: &str = "DATA_DIR";

/// Everything a node needs to start. Read from an optional TOML file, then
/// overridden by environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the server listens on and announces to peers
    pub node_addr: String,
    pub data_dir: PathBuf,
    pub peers: Vec<String>,
    /// Mining is enabled when set
    pub mining_address: Option<String>,
    pub sync_interval_secs: u64,
    pub peer_timeout_ms: u64,
    /// Inbound connection limit
    pub max_connections: usize,
    /// Blocks between two UTXO snapshots
    pub snapshot_interval: u64,
    /// Most blocks returned for one `GetBlocks` request
    pub max_block_batch: usize,
    pub consensus: ConsensusParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            node_addr: String::from(DEFAULT_NODE_ADDR),
            data_dir: PathBuf::from("data"),
            peers: vec![],
            mining_address: None,
            sync_interval_secs: 10,
            peer_timeout_ms: 5000,
            max_connections: 8,
            snapshot_interval: 100,
            max_block_batch: 500,
            consensus: ConsensusParams::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                info!("Loaded configuration from {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => NodeConfig::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<NodeConfig> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `NODE_ADDRESS`, `MINING_ADDRESS`, `NODE_PEERS` (comma
    /// separated) and `DATA_DIR` as returned by `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node_addr = addr;
        }
        if let Some(addr) = lookup(MINING_ADDRESS_KEY) {
            self.mining_address = Some(addr);
        }
        if let Some(peers) = lookup(NODE_PEERS_KEY) {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.consensus.validate()?;
        if let Some(address) = &self.mining_address {
            if !validate_address(address) {
                return Err(BlockchainError::InvalidAddress(address.clone()));
            }
        }
        if self.sync_interval_secs == 0 || self.peer_timeout_ms == 0 {
            return Err(BlockchainError::Config(
                "sync_interval_secs and peer_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_connections == 0 || self.max_block_batch == 0 || self.snapshot_interval == 0 {
            return Err(BlockchainError::Config(
                "max_connections, max_block_batch and snapshot_interval must be positive"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_miner(&self) -> bool {
        self.mining_address.is_some()
    }

    /// Where the chain store lives, one directory per listening port so
    /// several nodes can share a machine
    pub fn chain_path(&self) -> PathBuf {
        let node_id = self.node_addr.rsplit(':').next().unwrap_or("default");
        self.data_dir.join(format!("node_{node_id}"))
    }
}
