//! Configuration management
//!
//! Consensus parameters every node on a network must share, and the local
//! node settings around them.

pub mod params;
pub mod settings;

pub use params::ConsensusParams;
pub use settings::NodeConfig;
