//! # Cryptographic Primitives for Privy
//!
//! Thin wrappers around audited implementations:
//!
//! - **X25519** for sender/recipient key agreement.
//! - **BLAKE3** `derive_key` mode to turn agreements into box keys.
//! - **AES-256-GCM** for payload bodies and recipient boxes.
//! - **SHA3-512** (default) or **SHA-512/256** for transaction hashes.
//!
//! Nothing outside the enclave module touches private keys or box keys.

pub mod encryption;
pub mod hash;
pub mod keys;

pub use encryption::{open, seal, EncryptionError};
pub use hash::{digest_for, security_hash, PayloadDigest};
pub use keys::{KeyError, KeyPair, PublicKey};
