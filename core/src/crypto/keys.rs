//! # Key Management
//!
//! X25519 keypairs for Privy nodes and the public-key type used to address
//! recipients.
//!
//! A node holds one or more keypairs. The private halves never leave the
//! enclave; everything outside it (privacy checks, merges, the store) only
//! ever sees [`PublicKey`] values.
//!
//! ## Rendering
//!
//! Public keys are rendered as standard base64 at every boundary: logs,
//! error messages, CLI output. Hex is accepted on input for convenience.
//!
//! Key bytes of the private half are never logged. `KeyPair` has no
//! `Display` and its `Debug` output only shows the public key.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::StaticSecret;

use crate::config::{PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH};

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid private key bytes: expected {PRIVATE_KEY_LENGTH} bytes")]
    InvalidPrivateKey,

    #[error("invalid public key encoding: expected {PUBLIC_KEY_LENGTH} bytes as base64 or hex")]
    InvalidPublicKey,
}

/// The public half of a node identity. Safe to share, log, and persist.
///
/// Ordering is bytewise so that key sets (`BTreeSet<PublicKey>`) iterate in
/// the same order on every node.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LENGTH],
}

impl PublicKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Parse from a slice, checking the length.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.bytes
    }

    /// Standard base64 rendering.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }

    /// Parse a base64-encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    /// Hex rendering, used for file names where base64's `/` is unwelcome.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse either encoding. Hex is tried first since a 64-character hex
    /// string is never valid 32-byte base64.
    pub fn parse(encoded: &str) -> Result<Self, KeyError> {
        let trimmed = encoded.trim();
        if let Ok(bytes) = hex::decode(trimmed) {
            return Self::try_from_slice(&bytes);
        }
        Self::from_base64(trimmed)
    }

    pub(crate) fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

/// An X25519 keypair held by the enclave.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Rebuild a keypair from its 32-byte private key.
    pub fn from_private_bytes(bytes: [u8; PRIVATE_KEY_LENGTH]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    /// Rebuild a keypair from a hex-encoded private key, as stored in key files.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidPrivateKey)?;
        let bytes: [u8; PRIVATE_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_private_bytes(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from_bytes(x25519_dalek::PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    /// The public half.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Hex-encoded private key for writing key files. Handle with care.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// Raw X25519 agreement with a peer key.
    pub(crate) fn diffie_hellman(&self, peer: &PublicKey) -> [u8; 32] {
        self.secret.diffie_hellman(&peer.to_dalek()).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_distinct() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn private_hex_restores_same_public_key() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_hex(&kp.private_key_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn diffie_hellman_is_symmetric() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_eq!(
            a.diffie_hellman(&b.public_key()),
            b.diffie_hellman(&a.public_key())
        );
    }

    #[test]
    fn public_key_base64_and_hex_parse() {
        let key = KeyPair::generate().public_key();
        assert_eq!(PublicKey::from_base64(&key.to_base64()).unwrap(), key);
        assert_eq!(PublicKey::parse(&key.to_base64()).unwrap(), key);
        assert_eq!(PublicKey::parse(&key.to_hex()).unwrap(), key);
    }

    #[test]
    fn wrong_length_keys_are_rejected() {
        assert!(PublicKey::try_from_slice(&[1u8; 31]).is_err());
        assert!(PublicKey::parse("not a key").is_err());
        assert!(KeyPair::from_hex("abcd").is_err());
    }

    #[test]
    fn debug_output_hides_private_key() {
        let kp = KeyPair::generate();
        let debug = format!("{:?}", kp);
        assert!(!debug.contains(&kp.private_key_hex()));
        assert!(debug.contains(&kp.public_key().to_base64()));
    }
}
