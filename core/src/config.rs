//! # Core Configuration & Constants
//!
//! Every fixed size in Privy lives here, next to the small runtime
//! configuration the core needs ([`CoreConfig`]). Node-level settings such as
//! data directories and forwarding keys belong to the binary, not to this
//! crate.
//!
//! Sizes are part of the stored and published data format. Changing one
//! after a network has exchanged payloads orphans every record written
//! under the old value.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Key Material
// ---------------------------------------------------------------------------

/// X25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// X25519 static secret length in bytes.
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// Key agreement algorithm used between sender and recipient boxes.
pub const KEY_EXCHANGE_ALGORITHM: &str = "X25519";

/// Domain-separation context for deriving box keys from X25519 outputs.
pub const BOX_KEY_CONTEXT: &str = "privy v1 recipient box key";

// ---------------------------------------------------------------------------
// Symmetric Encryption
// ---------------------------------------------------------------------------

/// Cipher used for both the payload body and the recipient boxes.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// AES-256-GCM key length in bytes. Also the length of a payload master key.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Output length of the default payload digest (SHA3-512).
pub const SHA3_512_OUTPUT_LENGTH: usize = 64;

/// Output length of the SHA-512/256 payload digest.
pub const SHA512_256_OUTPUT_LENGTH: usize = 32;

/// Security hashes binding a transaction to an affected transaction are
/// always SHA3-512, independent of the configured payload digest.
pub const SECURITY_HASH_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors raised while loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigest(String),
}

/// Which hash function derives transaction identifiers from cipher text.
///
/// Every node of a network must agree on this value, otherwise the same
/// payload is filed under different hashes on different nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA3-512, 64-byte identifiers.
    #[default]
    #[serde(rename = "sha3-512")]
    Sha3_512,
    /// SHA-512/256, 32-byte identifiers.
    #[serde(rename = "sha512-256")]
    Sha512_256,
}

impl DigestAlgorithm {
    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha3_512 => "sha3-512",
            DigestAlgorithm::Sha512_256 => "sha512-256",
        }
    }

    /// Length of the identifiers this algorithm produces.
    pub fn output_length(&self) -> usize {
        match self {
            DigestAlgorithm::Sha3_512 => SHA3_512_OUTPUT_LENGTH,
            DigestAlgorithm::Sha512_256 => SHA512_256_OUTPUT_LENGTH,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha3-512" | "sha3_512" => Ok(DigestAlgorithm::Sha3_512),
            "sha512-256" | "sha512_256" => Ok(DigestAlgorithm::Sha512_256),
            other => Err(ConfigError::UnknownDigest(other.to_string())),
        }
    }
}

/// Runtime switches for the transaction core.
///
/// Defaults match a fresh network: standard privacy only, SHA3-512
/// transaction hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    /// Allows the party-protection, mandatory-recipients, and private-state
    /// validation modes. When off, only standard private transactions are
    /// accepted in either direction.
    pub enhanced_privacy: bool,

    /// Digest used for transaction identifiers.
    pub digest: DigestAlgorithm,
}

impl CoreConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
