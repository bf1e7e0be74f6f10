use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "powledger", about = "A minimal proof-of-work UTXO ledger node")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "TOML file with node settings; NODE_ADDRESS, MINING_ADDRESS, NODE_PEERS and DATA_DIR override it"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Generate a key pair and print its address")]
    Createwallet,
    #[command(
        name = "getbalance",
        about = "Get the balance of an address on the local active chain"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "printchain", about = "Print the active chain from the tip down")]
    Printchain,
    #[command(
        name = "reindexutxo",
        about = "Replay the stored chain and rewrite the UTXO snapshot"
    )]
    Reindexutxo,
    #[command(
        name = "send",
        about = "Pay an address from a wallet key, through a running node"
    )]
    Send {
        #[arg(long = "key", help = "Secret key of the paying wallet (pkcs8, hex)")]
        key: String,
        #[arg(long = "to", help = "Address to pay")]
        to: String,
        #[arg(long = "amount")]
        amount: u64,
        #[arg(long = "fee", default_value_t = 0)]
        fee: u64,
        #[arg(long = "node", help = "Node to submit to, defaults to the configured node address")]
        node: Option<String>,
    },
    #[command(name = "pending", about = "List the transactions waiting in a node's mempool")]
    Pending {
        #[arg(long = "node", help = "Node to ask, defaults to the configured node address")]
        node: Option<String>,
    },
    #[command(name = "startnode", about = "Start a node")]
    StartNode {
        #[arg(long = "miner", help = "Enable mining and send rewards to ADDRESS")]
        miner: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_config_and_miner() {
        let opt = Opt::try_parse_from([
            "powledger",
            "startnode",
            "--miner",
            "1abc",
            "--config",
            "node.toml",
        ])
        .unwrap();
        assert_eq!(opt.config, Some(PathBuf::from("node.toml")));
        assert!(matches!(opt.command, Command::StartNode { miner: Some(ref m) } if m == "1abc"));
    }

    #[test]
    fn test_send_defaults_fee_and_node() {
        let opt = Opt::try_parse_from([
            "powledger", "send", "--key", "3077", "--to", "1abc", "--amount", "20",
        ])
        .unwrap();
        match opt.command {
            Command::Send {
                key,
                to,
                amount,
                fee,
                node,
            } => {
                assert_eq!((key.as_str(), to.as_str()), ("3077", "1abc"));
                assert_eq!((amount, fee), (20, 0));
                assert_eq!(node, None);
            }
            other => panic!("parsed as {other:?}"),
        }
        assert!(Opt::try_parse_from(["powledger", "send", "--to", "1abc", "--amount", "1"]).is_err());
    }

    #[test]
    fn test_getbalance_requires_address() {
        assert!(Opt::try_parse_from(["powledger", "getbalance"]).is_err());
    }
}
