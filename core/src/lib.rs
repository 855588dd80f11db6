// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Privy — Private Transaction Manager Core
//!
//! Privy keeps transaction payloads private between the parties of a
//! transaction. A payload is encrypted once, its key is sealed separately
//! for every recipient, and each recipient node only ever receives its own
//! sealed key.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants and the core configuration file.
//! - **crypto** — X25519, BLAKE3, AES-256-GCM, SHA-3. Nothing home-made.
//! - **payload** — The encoded payload model and privacy modes.
//! - **enclave** — The boundary around private keys, plus a local implementation.
//! - **storage** — Transaction stores over sled.
//! - **privacy** — Rules for what each privacy mode allows.
//! - **transaction** — Send, intake, receive, and reconciliation.
//!
//! ## Design Philosophy
//!
//! 1. Collaborators are traits behind `Arc`. No global state.
//! 2. Private keys never leave the enclave.
//! 3. A payload that breaks its privacy rules is never stored.
//! 4. Every rule has a test.

pub mod config;
pub mod crypto;
pub mod enclave;
pub mod payload;
pub mod privacy;
pub mod storage;
pub mod transaction;
