// Entry point for the node binary
// Every command works on the chain stored under the configured data directory
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, info, LevelFilter};
use powledger::{
    address_to_pub_key_hash, convert_address, hash_pub_key, send_payment, Blockchain, ChainState,
    Command, Miner, NodeConfig, Opt, PeerManager, PeerTransport, RequestHandler, Server,
    SledStore, Synchronizer, TcpTransport, Wallet,
};
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    // Info level shows blocks, reorgs and sync progress without per-message noise
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.config.as_deref(), opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// Loads the chain for this node, replaying whatever the store holds
fn open_chain(config: &NodeConfig) -> Result<Blockchain, Box<dyn std::error::Error>> {
    let store = SledStore::open(&config.chain_path())?;
    let mut blockchain = Blockchain::open(Box::new(store), config.consensus.clone())?;
    blockchain.set_snapshot_interval(config.snapshot_interval);
    Ok(blockchain)
}

fn run_command(
    config_path: Option<&Path>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        // Keys are not stored anywhere: the caller keeps the printed secret
        Command::Createwallet => {
            let wallet = Wallet::new()?;
            println!("Your new address: {}", wallet.get_address());
            println!("Secret key (pkcs8, hex): {}", HEXLOWER.encode(wallet.get_pkcs8()));
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let config = NodeConfig::load(config_path)?;
            let blockchain = open_chain(&config)?;
            let balance = blockchain.get_utxo_set().balance(&pub_key_hash);
            println!("Balance of {address}: {balance}");
        }
        // Walks the active chain from the tip down to genesis
        Command::Printchain => {
            let config = NodeConfig::load(config_path)?;
            let blockchain = open_chain(&config)?;
            for block in blockchain.active_blocks() {
                println!("Height: {}", block.get_height());
                println!("Pre block hash: {}", block.get_pre_block_hash());
                println!("Cur block hash: {}", block.hash());
                println!("Cur block Timestamp: {}", block.get_timestamp());
                println!("Target: {}", block.get_target());

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", tx.id());

                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            let address = convert_address(pub_key_hash.as_slice());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                input.get_prev().txid,
                                input.get_prev().vout,
                                address,
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        let address = convert_address(output.get_pub_key_hash());
                        println!("-- Output value = {}, to = {}", output.get_value(), address)
                    }
                }
                println!()
            }
        }
        // Opening the chain already rebuilds the UTXO set by replay; this
        // just forces a fresh snapshot of the result
        Command::Reindexutxo => {
            let config = NodeConfig::load(config_path)?;
            let blockchain = open_chain(&config)?;
            blockchain.persist_snapshot()?;
            let count = blockchain.get_utxo_set().len();
            println!("Done! There are {count} unspent outputs in the UTXO set.");
        }
        Command::Send {
            key,
            to,
            amount,
            fee,
            node,
        } => {
            let config = NodeConfig::load(config_path)?;
            let node = node.unwrap_or(config.node_addr);
            let wallet = Wallet::from_pkcs8(&HEXLOWER.decode(key.trim().as_bytes())?)?;
            let transport = TcpTransport::new(Duration::from_millis(config.peer_timeout_ms));
            let payment = send_payment(&transport, &node, &wallet, &to, amount, fee)?;
            println!("Success! Sent {amount} to {to} in transaction {}", payment.id());
        }
        Command::Pending { node } => {
            let config = NodeConfig::load(config_path)?;
            let node = node.unwrap_or(config.node_addr);
            let transport = TcpTransport::new(Duration::from_millis(config.peer_timeout_ms));
            let entries = transport.get_mempool(&node)?;
            println!("{} pending transactions on {node}", entries.len());
            for entry in entries {
                println!(
                    "- {} fee = {}, outputs = {}",
                    entry.transaction.id(),
                    entry.fee,
                    entry.transaction.get_vout().len()
                );
            }
        }
        Command::StartNode { miner } => {
            let mut config = NodeConfig::load(config_path)?;
            if let Some(addr) = miner {
                config.mining_address = Some(addr);
                config.validate()?;
            }

            let blockchain = open_chain(&config)?;
            let state = ChainState::new(blockchain).into_shared();
            let shutdown = Arc::new(AtomicBool::new(false));
            let (sender, receiver) = channel();

            // The sync worker owns every outbound connection
            let synchronizer = Synchronizer::new(
                Arc::clone(&state),
                TcpTransport::new(Duration::from_millis(config.peer_timeout_ms)),
                config.peers.clone(),
            )
            .with_node_addr(config.node_addr.clone());
            let sync_interval = Duration::from_secs(config.sync_interval_secs);
            let sync_shutdown = Arc::clone(&shutdown);
            thread::spawn(move || synchronizer.run(receiver, sync_interval, sync_shutdown));

            if let Some(address) = &config.mining_address {
                println!("Mining is on. Address to receive rewards: {address}");
                let miner = Miner::new(Arc::clone(&state), address_to_pub_key_hash(address)?)
                    .with_relay(sender.clone());
                let miner_shutdown = Arc::clone(&shutdown);
                thread::spawn(move || miner.run(miner_shutdown));
            }

            info!(
                "Starting node on {} with {} configured peers",
                config.node_addr,
                config.peers.len()
            );
            let handler = RequestHandler::new(state)
                .with_notifier(sender)
                .with_max_block_batch(config.max_block_batch);
            let server = Server::new(handler, Arc::new(PeerManager::new(config.max_connections)));
            server
                .run(&config.node_addr)
                .map_err(|e| format!("Server error: {e}"))?
        }
    }
    Ok(())
}
