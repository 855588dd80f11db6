//! # Hashing Utilities
//!
//! Two kinds of hash are computed over payloads:
//!
//! - **Transaction hash** — identifies a payload by its cipher text. The
//!   function is configurable per network ([`DigestAlgorithm`]); SHA3-512 is
//!   the default, SHA-512/256 the shorter alternative. All nodes must agree.
//!
//! - **Security hash** — binds a transaction to one of the transactions it
//!   affects. Always SHA3-512, computed as
//!   `SHA3-512(cipher_text || affected_cipher_text || master_key)`.
//!   Only a party that can open the payload knows the master key, so only
//!   such a party can produce or check the binding.

use sha2::{Digest, Sha512_256};
use sha3::Sha3_512;

use crate::config::DigestAlgorithm;

/// Hash function mapping cipher text to a transaction identifier.
pub trait PayloadDigest: Send + Sync {
    /// Digest the given bytes.
    fn digest(&self, data: &[u8]) -> Vec<u8>;

    /// Which algorithm this is.
    fn algorithm(&self) -> DigestAlgorithm;
}

/// SHA3-512 transaction hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha3Digest;

impl PayloadDigest for Sha3Digest {
    fn digest(&self, data: &[u8]) -> Vec<u8> {
        sha3_512(data).to_vec()
    }

    fn algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::Sha3_512
    }
}

/// SHA-512/256 transaction hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512_256Digest;

impl PayloadDigest for Sha512_256Digest {
    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha512_256::digest(data).to_vec()
    }

    fn algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::Sha512_256
    }
}

/// Pick the digest implementation for a configured algorithm.
pub fn digest_for(algorithm: DigestAlgorithm) -> Box<dyn PayloadDigest> {
    match algorithm {
        DigestAlgorithm::Sha3_512 => Box::new(Sha3Digest),
        DigestAlgorithm::Sha512_256 => Box::new(Sha512_256Digest),
    }
}

/// SHA3-512 of the input.
pub fn sha3_512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha3_512::new();
    hasher.update(data);
    to_array(&hasher.finalize())
}

/// Security hash binding `cipher_text` to an affected transaction's cipher text.
pub fn security_hash(cipher_text: &[u8], affected_cipher_text: &[u8], master_key: &[u8]) -> [u8; 64] {
    let mut hasher = Sha3_512::new();
    hasher.update(cipher_text);
    hasher.update(affected_cipher_text);
    hasher.update(master_key);
    to_array(&hasher.finalize())
}

fn to_array(digest: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(digest);
    out
}
