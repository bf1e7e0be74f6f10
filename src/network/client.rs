use crate::core::{Block, BlockLocator, Hash256, OutPoint, TXOutput, TipInfo, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::protocol::{read_message, write_message, MempoolEntry, Request, Response};
use crate::wallet::Wallet;
use log::debug;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const DEFAULT_PEER_TIMEOUT_MS: u64 = 5000;

fn unexpected(peer: &str, response: Response) -> BlockchainError {
    match response {
        Response::Error(message) => {
            BlockchainError::Network(format!("Peer {peer} reported an error: {message}"))
        }
        other => BlockchainError::Network(format!(
            "Peer {peer} sent an unexpected {} response",
            other.kind()
        )),
    }
}

/// Outbound side of the protocol. `call` is the only thing a transport has
/// to provide; the typed calls are built on it.
pub trait PeerTransport: Send + Sync {
    fn call(&self, peer: &str, request: &Request) -> Result<Response>;

    fn get_tip(&self, peer: &str) -> Result<TipInfo> {
        match self.call(peer, &Request::GetTip)? {
            Response::Tip(tip) => Ok(tip),
            other => Err(unexpected(peer, other)),
        }
    }

    fn get_blocks(&self, peer: &str, from: BlockLocator) -> Result<Vec<Block>> {
        match self.call(peer, &Request::GetBlocks { from })? {
            Response::Blocks(blocks) => Ok(blocks),
            other => Err(unexpected(peer, other)),
        }
    }

    fn get_block(&self, peer: &str, hash: Hash256) -> Result<Option<Block>> {
        match self.call(peer, &Request::GetBlock { hash })? {
            Response::Block(block) => Ok(block),
            other => Err(unexpected(peer, other)),
        }
    }

    /// The peer's verdict, accepted or rejected
    fn submit_transaction(&self, peer: &str, transaction: &Transaction) -> Result<Response> {
        self.call(
            peer,
            &Request::SubmitTransaction {
                transaction: transaction.clone(),
            },
        )
    }

    fn submit_block(&self, peer: &str, block: &Block, addr_from: Option<&str>) -> Result<Response> {
        self.call(
            peer,
            &Request::SubmitBlock {
                block: block.clone(),
                addr_from: addr_from.map(str::to_string),
            },
        )
    }

    fn get_mempool(&self, peer: &str) -> Result<Vec<MempoolEntry>> {
        match self.call(peer, &Request::GetMempool)? {
            Response::Mempool(entries) => Ok(entries),
            other => Err(unexpected(peer, other)),
        }
    }

    fn get_utxos(&self, peer: &str, pub_key_hash: &[u8]) -> Result<Vec<(OutPoint, TXOutput)>> {
        let request = Request::GetUtxos {
            pub_key_hash: pub_key_hash.to_vec(),
        };
        match self.call(peer, &request)? {
            Response::Utxos(outputs) => Ok(outputs),
            other => Err(unexpected(peer, other)),
        }
    }
}

/// Pays `amount` to `to_address` from the outputs `node` reports for
/// `wallet`, and submits the payment there. Returns the accepted payment.
pub fn send_payment<T: PeerTransport + ?Sized>(
    transport: &T,
    node: &str,
    wallet: &Wallet,
    to_address: &str,
    amount: u64,
    fee: u64,
) -> Result<Transaction> {
    let recipient = TXOutput::to_address(amount, to_address)?;
    let spendable = transport.get_utxos(node, &wallet.get_pub_key_hash())?;
    let payment = wallet.create_payment(
        &spendable,
        recipient.get_pub_key_hash(),
        recipient.get_value(),
        fee,
    )?;
    match transport.submit_transaction(node, &payment)? {
        Response::TransactionAccepted { txid } => {
            debug!("{node} accepted payment {txid}");
            Ok(payment)
        }
        Response::TransactionRejected(reason) => Err(BlockchainError::Transaction(reason)),
        other => Err(unexpected(node, other)),
    }
}

/// JSON over TCP, one connection per call
pub struct TcpTransport {
    timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport::new(Duration::from_millis(DEFAULT_PEER_TIMEOUT_MS))
    }
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> TcpTransport {
        TcpTransport { timeout }
    }

    fn resolve(peer: &str) -> Result<SocketAddr> {
        peer.to_socket_addrs()
            .map_err(|e| BlockchainError::PeerUnavailable(format!("{peer}: {e}")))?
            .next()
            .ok_or_else(|| BlockchainError::PeerUnavailable(format!("{peer}: no address")))
    }
}

impl PeerTransport for TcpTransport {
    fn call(&self, peer: &str, request: &Request) -> Result<Response> {
        let unavailable = |e: std::io::Error| BlockchainError::PeerUnavailable(format!("{peer}: {e}"));

        let addr = Self::resolve(peer)?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(unavailable)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(unavailable)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(unavailable)?;

        write_message(&stream, request).map_err(|e| {
            BlockchainError::PeerUnavailable(format!("{peer}: {e}"))
        })?;
        stream.shutdown(Shutdown::Write).map_err(unavailable)?;

        let response: Response = read_message(&stream)
            .map_err(|e| BlockchainError::PeerUnavailable(format!("{peer}: {e}")))?;
        debug!("{peer} answered with {}", response.kind());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_unreachable_peer_is_unavailable() {
        // bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let transport = TcpTransport::new(Duration::from_millis(200));
        let err = transport.get_tip(&format!("127.0.0.1:{port}")).unwrap_err();
        assert!(matches!(err, BlockchainError::PeerUnavailable(_)));

        let err = transport.get_tip("not an address").unwrap_err();
        assert!(matches!(err, BlockchainError::PeerUnavailable(_)));
    }

    struct Canned(Response);

    impl PeerTransport for Canned {
        fn call(&self, _peer: &str, _request: &Request) -> Result<Response> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_mismatched_response_is_an_error() {
        let transport = Canned(Response::Blocks(vec![]));
        assert!(matches!(
            transport.get_tip("peer"),
            Err(BlockchainError::Network(_))
        ));
        assert_eq!(
            transport.get_blocks("peer", BlockLocator::Height(0)).unwrap(),
            vec![]
        );
    }
}
