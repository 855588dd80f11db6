//! # CLI Interface
//!
//! Defines the command-line argument structure for `privy-node` using
//! `clap` derive.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Privy private transaction manager node.
///
/// Encrypts transaction payloads for their recipients, stores the payloads
/// this node is party to, and decrypts them on request.
#[derive(Parser, Debug)]
#[command(
    name = "privy-node",
    about = "Privy private transaction manager node",
    version,
    propagate_version = true
)]
pub struct PrivyNodeCli {
    /// Node data directory holding config, keys, database, and outbox.
    #[arg(long, short = 'd', global = true, env = "PRIVY_DATA_DIR", default_value = ".privy")]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, global = true, env = "PRIVY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Privy node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a data directory and generate the default key.
    Init(InitArgs),
    /// Generate an additional managed key.
    Keygen,
    /// Encrypt and send a transaction.
    Send(SendArgs),
    /// Decrypt a stored transaction.
    Receive(ReceiveArgs),
    /// Store a payload published by another node.
    Ingest(IngestArgs),
    /// Delete a stored transaction.
    Delete(DeleteArgs),
    /// Print node status as JSON.
    Status,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Allow party-protection, mandatory-recipients, and PSV transactions.
    #[arg(long, env = "PRIVY_ENHANCED_PRIVACY")]
    pub enhanced_privacy: bool,

    /// Transaction hash digest: "sha3-512" or "sha512-256".
    #[arg(long, default_value = "sha3-512")]
    pub digest: String,

    /// Keys (hex or base64) that receive a copy of every outgoing transaction.
    #[arg(long = "forward", value_name = "KEY")]
    pub forwarding_keys: Vec<String>,
}

/// Arguments for the `send` subcommand.
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Sender key (hex or base64). Defaults to the node's default key.
    #[arg(long)]
    pub from: Option<String>,

    /// Recipient keys (hex or base64).
    #[arg(long = "to", value_name = "KEY", required = true)]
    pub recipients: Vec<String>,

    /// Message to send, as UTF-8 text.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub message: Option<String>,

    /// File whose bytes are sent.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Privacy mode: standard-private, party-protection,
    /// mandatory-recipients, or private-state-validation.
    #[arg(long, default_value = "standard-private")]
    pub mode: String,

    /// Hashes (base64) of transactions this one affects.
    #[arg(long = "affected", value_name = "HASH")]
    pub affected: Vec<String>,

    /// Mandatory recipient keys, for the mandatory-recipients mode.
    #[arg(long = "mandatory", value_name = "KEY")]
    pub mandatory: Vec<String>,

    /// Hex execution hash, for private state validation.
    #[arg(long)]
    pub exec_hash: Option<String>,

    /// Privacy group identifier (base64).
    #[arg(long)]
    pub privacy_group: Option<String>,
}

/// Arguments for the `receive` subcommand.
#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Transaction hash (base64).
    pub hash: String,

    /// Key to decrypt with. Found by trial when omitted.
    #[arg(long)]
    pub to: Option<String>,

    /// Read from the raw transaction store.
    #[arg(long)]
    pub raw: bool,

    /// Write the plaintext here instead of printing it.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Arguments for the `ingest` subcommand.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Payload files produced by another node's outbox.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the `delete` subcommand.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Transaction hash (base64).
    pub hash: String,
}
