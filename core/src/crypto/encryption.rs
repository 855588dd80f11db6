//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for payload bodies and recipient boxes.
//!
//! Unlike a self-contained `nonce || ciphertext` format, an encoded payload
//! carries its nonces as separate fields: one nonce for the body, one shared
//! by every recipient box. The functions here therefore take and return
//! nonces explicitly.
//!
//! ## Keys
//!
//! ```text
//!   master key (random, per payload) ── AES-GCM(cipher_text_nonce) ──► cipher text
//!        │
//!        └─ per recipient: box key = BLAKE3-derive-key(DH(sender, recipient))
//!                          AES-GCM(recipient_nonce, box key) ──► recipient box
//! ```
//!
//! A box key is only ever used with one recipient nonce, and each payload
//! draws a fresh recipient nonce, so (key, nonce) pairs never repeat.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, BOX_KEY_CONTEXT};

/// Errors that can occur during encryption/decryption.
///
/// Wrong key and tampered cipher text are deliberately indistinguishable.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("invalid nonce length: expected {AES_NONCE_LENGTH} bytes")]
    InvalidNonceLength,
}

/// Fresh random AES nonce.
pub fn random_nonce() -> [u8; AES_NONCE_LENGTH] {
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Fresh random payload master key.
pub fn random_master_key() -> [u8; AES_KEY_LENGTH] {
    let mut key = [0u8; AES_KEY_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Encrypt `plaintext` under `key` with the given nonce.
///
/// The returned buffer is cipher text followed by the 16-byte GCM tag.
pub fn seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;
    if nonce.len() != AES_NONCE_LENGTH {
        return Err(EncryptionError::InvalidNonceLength);
    }

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)
}

/// Decrypt data produced by [`seal`] with the same key and nonce.
pub fn open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;
    if nonce.len() != AES_NONCE_LENGTH {
        return Err(EncryptionError::InvalidNonceLength);
    }

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Derive the symmetric key protecting one recipient box.
///
/// ```text
///   box_key = BLAKE3-derive-key(
///     context = BOX_KEY_CONTEXT,
///     input   = shared_secret || min(pub_a, pub_b) || max(pub_a, pub_b)
///   )
/// ```
///
/// The public keys are sorted so that sender and recipient derive the same
/// key from their respective sides of the agreement.
pub fn derive_box_key(
    shared_secret: &[u8; 32],
    pub_a: &[u8; 32],
    pub_b: &[u8; 32],
) -> [u8; AES_KEY_LENGTH] {
    let mut hasher = blake3::Hasher::new_derive_key(BOX_KEY_CONTEXT);
    hasher.update(shared_secret);

    let (first, second) = if pub_a <= pub_b {
        (pub_a, pub_b)
    } else {
        (pub_b, pub_a)
    };
    hasher.update(first);
    hasher.update(second);

    let mut key = [0u8; AES_KEY_LENGTH];
    hasher.finalize_xof().fill(&mut key);
    key
}
