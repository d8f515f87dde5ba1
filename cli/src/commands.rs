use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Process arguments.
#[derive(Debug, Parser)]
#[command(name = "batchwire", version, about = "Atomic call batches and smart-account user operations")]
pub struct Cli {
    /// Directory holding `base.yaml` and the per-environment overlays.
    #[arg(long, env = "BATCHWIRE_CONFIG_DIR", default_value = "configuration")]
    pub config_dir: PathBuf,

    /// Connect to this wallet (index, name or uuid) on startup.
    #[arg(long)]
    pub wallet: Option<String>,

    /// Hex private key file of the smart account owner.
    #[arg(long, env = "BATCHWIRE_OWNER_KEY_FILE")]
    pub key_file: Option<PathBuf>,
}

/// One line typed into the session.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_version_flag = true, infer_subcommands = true)]
pub struct SessionLine {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// List announced wallets
    Wallets,
    /// Connect to a wallet by index, name or uuid
    Connect { wallet: Option<String> },
    Disconnect,
    /// Connected account, balance and chain
    Status,
    /// Query wallet capabilities for the connected chain
    Capabilities,
    /// Queue a native transfer
    Add { to: String, amount: String },
    /// Queue a contract call with raw calldata
    AddCall {
        to: String,
        data: String,
        #[arg(long, default_value = "0")]
        value: String,
    },
    /// Show queued calls
    Calls,
    /// Drop all queued calls
    Clear,
    /// Send the queued calls with wallet_sendCalls and watch for confirmation
    Submit {
        /// Let the wallet fall back to non-atomic execution.
        #[arg(long)]
        no_atomic: bool,
    },
    /// Query a batch status once, defaulting to the last submission
    BatchStatus { id: Option<String> },
    /// Stop watching the last submission
    Cancel,
    #[command(subcommand)]
    Account(AccountCommand),
    Quit,
}

#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Generate a throwaway owner key kept in memory only
    New,
    /// Use the owner key stored in a file
    Load { key_file: PathBuf },
    /// Smart account address and balances
    Info,
    /// Send native currency or the paymaster token
    Send {
        to: String,
        amount: String,
        /// Transfer the paymaster token instead of native currency.
        #[arg(long)]
        token: bool,
        /// Pay gas in the paymaster token.
        #[arg(long)]
        paymaster: bool,
    },
    /// Wrap native currency into WETH
    Wrap {
        amount: String,
        #[arg(long)]
        paymaster: bool,
    },
    /// Quote WETH into the paymaster token
    Quote { amount: String },
    /// Swap WETH into the paymaster token
    Swap {
        amount: String,
        #[arg(long)]
        slippage_bps: Option<u16>,
        #[arg(long)]
        paymaster: bool,
    },
}

impl SessionLine {
    /// Splits on whitespace; `None` for a blank line.
    pub fn parse_line(line: &str) -> Option<Result<Self, clap::Error>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return None;
        }
        Some(Self::try_parse_from(words))
    }
}
