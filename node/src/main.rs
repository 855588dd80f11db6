// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Privy Node
//!
//! Entry point for the `privy-node` binary. Parses CLI arguments,
//! initializes logging, opens the node's data directory, and runs one
//! command against the transaction manager.
//!
//! - `init`    — create the data directory and the default key
//! - `keygen`  — add another managed key
//! - `send`    — encrypt, store, and publish a transaction to the outbox
//! - `receive` — decrypt a stored transaction
//! - `ingest`  — store payloads taken from another node's outbox
//! - `delete`  — remove a stored transaction
//! - `status`  — print keys, store counts, and health as JSON
//! - `version` — print build version information

mod cli;
mod config;
mod logging;
mod outbox;
mod runtime;

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use privy_core::config::DigestAlgorithm;
use privy_core::crypto::{KeyPair, PublicKey};
use privy_core::enclave::Enclave;
use privy_core::payload::{EncodedPayload, PrivacyGroupId, PrivacyMode, TxHash};
use privy_core::storage::EncryptedTransactionStore;
use privy_core::transaction::{ReceiveRequest, SendRequest};

use cli::{Commands, PrivyNodeCli};
use config::DataDir;
use runtime::Runtime;

fn main() -> Result<()> {
    let cli = PrivyNodeCli::parse();
    logging::init_logging(cli.log_format);
    let data_dir = DataDir::new(cli.data_dir);

    match cli.command {
        Commands::Init(args) => init_node(&data_dir, args),
        Commands::Keygen => generate_key(&data_dir),
        Commands::Send(args) => send(&data_dir, args),
        Commands::Receive(args) => receive(&data_dir, args),
        Commands::Ingest(args) => ingest(&data_dir, args),
        Commands::Delete(args) => delete(&data_dir, args),
        Commands::Status => status(&data_dir),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn init_node(data_dir: &DataDir, args: cli::InitArgs) -> Result<()> {
    let digest: DigestAlgorithm = args.digest.parse()?;
    let public_key = runtime::initialize(data_dir, args.enhanced_privacy, digest, &args.forwarding_keys)?;

    println!("Node initialized successfully.");
    println!("  Data directory   : {}", data_dir.root().display());
    println!("  Enhanced privacy : {}", args.enhanced_privacy);
    println!("  Digest           : {digest}");
    println!("  Public key       : {public_key}");
    Ok(())
}

fn generate_key(data_dir: &DataDir) -> Result<()> {
    // Fail before writing anything into an uninitialized directory.
    data_dir.load_config()?;

    let pair = KeyPair::generate();
    let key_path = data_dir.write_key(&pair)?;
    tracing::info!(public_key = %pair.public_key(), key_path = %key_path.display(), "key generated");

    println!("{}", pair.public_key());
    Ok(())
}

fn send(data_dir: &DataDir, args: cli::SendArgs) -> Result<()> {
    let runtime = Runtime::open(data_dir)?;

    let sender = match &args.from {
        Some(encoded) => parse_key(encoded)?,
        None => runtime.manager.default_public_key(),
    };
    let payload = match (&args.message, &args.file) {
        (Some(message), _) => message.clone().into_bytes(),
        (None, Some(path)) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        (None, None) => Vec::new(),
    };

    let request = SendRequest {
        sender,
        recipients: args.recipients.iter().map(|k| parse_key(k)).collect::<Result<_>>()?,
        payload,
        privacy_mode: args.mode.parse::<PrivacyMode>()?,
        affected_contract_transactions: args.affected.iter().map(|h| parse_hash(h)).collect::<Result<_>>()?,
        exec_hash: match &args.exec_hash {
            Some(encoded) => hex::decode(encoded).context("exec hash is not hex")?,
            None => Vec::new(),
        },
        mandatory_recipients: args
            .mandatory
            .iter()
            .map(|k| parse_key(k))
            .collect::<Result<BTreeSet<_>>>()?,
        privacy_group_id: args
            .privacy_group
            .as_deref()
            .map(PrivacyGroupId::from_base64)
            .transpose()?,
    };

    let response = runtime.manager.send(&request)?;
    print_json(&json!({
        "hash": response.hash.to_string(),
        "sender": response.sender.to_string(),
        "managedParties": response.managed_parties.iter().map(ToString::to_string).collect::<Vec<_>>(),
    }))?;
    runtime.close()
}

fn receive(data_dir: &DataDir, args: cli::ReceiveArgs) -> Result<()> {
    let runtime = Runtime::open(data_dir)?;

    let mut request = ReceiveRequest::new(parse_hash(&args.hash)?);
    if let Some(encoded) = &args.to {
        request = request.with_recipient(parse_key(encoded)?);
    }
    if args.raw {
        request = request.raw();
    }
    let response = runtime.manager.receive(&request)?;

    match &args.output {
        Some(path) => std::fs::write(path, &response.unencrypted_data)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            print_json(&json!({
                "payload": String::from_utf8_lossy(&response.unencrypted_data),
                "payloadHex": hex::encode(&response.unencrypted_data),
                "privacyMode": response.privacy_mode.as_str(),
                "sender": response.sender.to_string(),
                "managedParties": response.managed_parties.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "affectedTransactions": response.affected_transactions.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "execHash": hex::encode(&response.exec_hash),
                "privacyGroupId": response.privacy_group_id.as_ref().map(ToString::to_string),
            }))?;
        }
    }
    runtime.close()
}

fn ingest(data_dir: &DataDir, args: cli::IngestArgs) -> Result<()> {
    let runtime = Runtime::open(data_dir)?;

    for path in &args.files {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let payload = EncodedPayload::from_bytes(&bytes)
            .with_context(|| format!("{} is not an encoded payload", path.display()))?;
        let hash = runtime
            .manager
            .store_payload(&payload)
            .with_context(|| format!("failed to store payload from {}", path.display()))?;
        println!("{hash}");
    }
    runtime.close()
}

fn delete(data_dir: &DataDir, args: cli::DeleteArgs) -> Result<()> {
    let runtime = Runtime::open(data_dir)?;
    runtime.manager.delete(&parse_hash(&args.hash)?)?;
    runtime.close()
}

fn status(data_dir: &DataDir) -> Result<()> {
    let runtime = Runtime::open(data_dir)?;
    let enclave = &runtime.enclave;

    print_json(&json!({
        "enclave": enclave.status().to_string(),
        "upcheck": runtime.manager.upcheck(),
        "defaultKey": enclave.default_public_key().to_string(),
        "keys": enclave.public_keys().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "forwardingKeys": enclave.forwarding_keys().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "transactions": runtime.store.transaction_count(),
        "rawTransactions": runtime.store.raw_transaction_count(),
        "enhancedPrivacy": runtime.config.core.enhanced_privacy,
        "digest": runtime.config.core.digest.as_str(),
    }))?;
    runtime.close()
}

fn parse_key(encoded: &str) -> Result<PublicKey> {
    PublicKey::parse(encoded).with_context(|| format!("invalid public key {encoded}"))
}

fn parse_hash(encoded: &str) -> Result<TxHash> {
    TxHash::from_base64(encoded).with_context(|| format!("invalid transaction hash {encoded}"))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("privy-node {}", env!("CARGO_PKG_VERSION"));
    println!("crypto     {} + {}", privy_core::config::KEY_EXCHANGE_ALGORITHM, privy_core::config::SYMMETRIC_ALGORITHM);
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
