use crate::error::{BlockchainError, Result};
use log::info;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::RwLock;

/// Tracks inbound connections and enforces the connection limit.
///
/// No reputation, banning or discovery: outbound peers come from the node
/// configuration.
pub struct PeerManager {
    /// Currently connected peers
    connected_peers: RwLock<HashSet<SocketAddr>>,
    /// Maximum number of inbound connections
    max_connections: usize,
}

impl PeerManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connected_peers: RwLock::new(HashSet::new()),
            max_connections,
        }
    }

    /// Record an accepted connection. Fails once the limit is reached.
    pub fn record_connection(&self, address: SocketAddr) -> Result<()> {
        let mut connected = self
            .connected_peers
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;

        if connected.len() >= self.max_connections {
            return Err(BlockchainError::Network(format!(
                "Connection limit of {} reached",
                self.max_connections
            )));
        }
        connected.insert(address);
        info!("Connected to peer: {address}");
        Ok(())
    }

    /// Record a disconnection
    pub fn record_disconnection(&self, address: SocketAddr) -> Result<()> {
        let mut connected = self
            .connected_peers
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;

        connected.remove(&address);
        info!("Disconnected from peer: {address}");
        Ok(())
    }

    pub fn get_connected_count(&self) -> Result<usize> {
        let connected = self
            .connected_peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;
        Ok(connected.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let manager = PeerManager::new(8);
        let addr = "127.0.0.1:2001".parse().unwrap();

        manager.record_connection(addr).unwrap();
        assert_eq!(manager.get_connected_count().unwrap(), 1);

        manager.record_disconnection(addr).unwrap();
        assert_eq!(manager.get_connected_count().unwrap(), 0);
    }

    #[test]
    fn test_connection_limits() {
        let manager = PeerManager::new(2);
        let addr1 = "127.0.0.1:40001".parse().unwrap();
        let addr2 = "127.0.0.1:40002".parse().unwrap();
        let addr3 = "127.0.0.1:40003".parse().unwrap();

        manager.record_connection(addr1).unwrap();
        manager.record_connection(addr2).unwrap();
        assert!(manager.record_connection(addr3).is_err());

        // a freed slot can be taken again
        manager.record_disconnection(addr1).unwrap();
        manager.record_connection(addr3).unwrap();
        assert_eq!(manager.get_connected_count().unwrap(), 2);
    }
}
