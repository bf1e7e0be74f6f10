//! Peer-to-peer synchronization
//!
//! A small request/response protocol (JSON over TCP, one exchange per
//! connection): tips, block ranges, single blocks, submission of
//! transactions and blocks, and wallet queries for pending transactions and
//! spendable outputs. The sync worker uses it to catch up with peers
//! and to relay what the node accepts.

pub mod client;
pub mod peers;
pub mod protocol;
pub mod server;
pub mod sync;

pub use client::{send_payment, PeerTransport, TcpTransport};
pub use peers::PeerManager;
pub use protocol::{MempoolEntry, Request, Response, MAX_MESSAGE_SIZE};
pub use server::{RequestHandler, Server, DEFAULT_MAX_BLOCK_BATCH};
pub use sync::{Synchronizer, SyncCommand, MAX_ANCESTOR_DEPTH};
