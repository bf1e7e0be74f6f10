use crate::core::chain_state::{read_state, write_state};
use crate::core::{ProcessOutcome, SharedChainState};
use crate::error::{BlockchainError, Result};
use crate::network::protocol::{read_message, write_message, MempoolEntry, Request, Response};
use crate::network::{PeerManager, SyncCommand};
use crate::utils::current_timestamp;
use log::{debug, error, info, warn};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const TCP_READ_TIMEOUT: u64 = 30_000;
const TCP_WRITE_TIMEOUT: u64 = 5000;
pub const DEFAULT_MAX_BLOCK_BATCH: usize = 500;

/// Answers protocol requests against the shared chain state. Independent of
/// TCP so other transports (and tests) can drive it directly.
pub struct RequestHandler {
    state: SharedChainState,
    notifier: Option<Mutex<Sender<SyncCommand>>>,
    max_block_batch: usize,
}

impl RequestHandler {
    pub fn new(state: SharedChainState) -> RequestHandler {
        RequestHandler {
            state,
            notifier: None,
            max_block_batch: DEFAULT_MAX_BLOCK_BATCH,
        }
    }

    /// Accepted items and orphans are reported to the sync worker
    pub fn with_notifier(mut self, notifier: Sender<SyncCommand>) -> RequestHandler {
        self.notifier = Some(Mutex::new(notifier));
        self
    }

    pub fn with_max_block_batch(mut self, max_block_batch: usize) -> RequestHandler {
        self.max_block_batch = max_block_batch.max(1);
        self
    }

    fn notify(&self, command: SyncCommand) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let sent = notifier
            .lock()
            .map(|sender| sender.send(command).is_ok())
            .unwrap_or(false);
        if !sent {
            warn!("Sync worker is not listening, dropping notification");
        }
    }

    pub fn handle(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to handle request: {e}");
                Response::Error(e.to_string())
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::GetTip => Ok(Response::Tip(read_state(&self.state)?.tip_info())),
            Request::GetBlocks { from } => {
                let state = read_state(&self.state)?;
                Ok(Response::Blocks(
                    state.get_blockchain().blocks_after(&from, self.max_block_batch),
                ))
            }
            Request::GetBlock { hash } => {
                let state = read_state(&self.state)?;
                Ok(Response::Block(state.get_blockchain().get_block(&hash).cloned()))
            }
            Request::SubmitTransaction { transaction } => {
                let result = write_state(&self.state)?.submit_transaction(transaction.clone());
                match result {
                    Ok(txid) => {
                        self.notify(SyncCommand::RelayTransaction(transaction));
                        Ok(Response::TransactionAccepted { txid })
                    }
                    Err(e) => {
                        debug!("Rejected transaction {}: {e}", transaction.id());
                        Ok(Response::TransactionRejected(e))
                    }
                }
            }
            Request::SubmitBlock { block, addr_from } => {
                let now = current_timestamp()?;
                let result = write_state(&self.state)?.submit_block(block.clone(), now);
                match result {
                    Ok(update) => {
                        match update.outcome {
                            ProcessOutcome::Orphaned => {
                                if let Some(peer) = addr_from {
                                    self.notify(SyncCommand::ResolveOrphan {
                                        peer,
                                        hash: update.hash,
                                    });
                                }
                            }
                            ProcessOutcome::Extended | ProcessOutcome::Reorganized { .. } => {
                                self.notify(SyncCommand::RelayBlock(block));
                            }
                            ProcessOutcome::SideBranch | ProcessOutcome::AlreadyKnown => {}
                        }
                        Ok(Response::BlockAccepted {
                            hash: update.hash,
                            outcome: update.outcome,
                        })
                    }
                    Err(BlockchainError::Block(e)) => {
                        warn!("Rejected block {}: {e}", block.hash());
                        Ok(Response::BlockRejected(e))
                    }
                    Err(e) => Err(e),
                }
            }
            Request::GetMempool => {
                let state = read_state(&self.state)?;
                let pool = state.get_mempool();
                let entries = pool
                    .get_all()
                    .into_iter()
                    .map(|transaction| MempoolEntry {
                        fee: pool.fee_of(&transaction.id()).unwrap_or(0),
                        transaction,
                    })
                    .collect();
                Ok(Response::Mempool(entries))
            }
            Request::GetUtxos { pub_key_hash } => {
                let state = read_state(&self.state)?;
                let pool = state.get_mempool();
                let outputs = state
                    .get_blockchain()
                    .get_utxo_set()
                    .find_outputs(&pub_key_hash)
                    .into_iter()
                    .filter(|(outpoint, _)| !pool.spends(outpoint))
                    .collect();
                Ok(Response::Utxos(outputs))
            }
        }
    }
}

/// TCP front end: one thread per connection, one request per connection
pub struct Server {
    handler: Arc<RequestHandler>,
    peer_manager: Arc<PeerManager>,
}

impl Server {
    pub fn new(handler: RequestHandler, peer_manager: Arc<PeerManager>) -> Self {
        Self {
            handler: Arc::new(handler),
            peer_manager,
        }
    }

    /// Binds `addr` and serves until the listener fails
    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        info!("Server listening on {addr}");
        self.serve(listener)
    }

    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    if let Err(e) = self.peer_manager.record_connection(peer_addr) {
                        warn!("Rejecting connection from {peer_addr}: {e}");
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }
                    if let Ok(open) = self.peer_manager.get_connected_count() {
                        debug!("Accepted connection from {peer_addr}, {open} open");
                    }

                    let handler = Arc::clone(&self.handler);
                    let peer_manager = Arc::clone(&self.peer_manager);
                    thread::spawn(move || {
                        let result = Self::handle_connection(&handler, &stream, peer_addr);
                        let _ = stream.shutdown(Shutdown::Both);

                        if let Err(e) = peer_manager.record_disconnection(peer_addr) {
                            warn!("Failed to record disconnection: {e}");
                        }
                        if let Err(e) = result {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    fn handle_connection(
        handler: &RequestHandler,
        stream: &TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;

        let request: Request = read_message(stream)?;
        debug!("Received request from {peer_addr}: {request:?}");
        let response = handler.handle(request);
        write_message(stream, &response)
    }
}
