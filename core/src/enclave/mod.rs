//! # Enclave Boundary
//!
//! Everything that touches private key material sits behind the [`Enclave`]
//! trait. The transaction core only hands it public keys and opaque bytes,
//! and gets back encoded payloads, recipient boxes, and plaintext.
//!
//! ```text
//!   TransactionManager ──► Enclave::encrypt_payload ──► EncodedPayload
//!                     ──► Enclave::unencrypt_transaction ──► plaintext
//!                     ──► Enclave::find_invalid_security_hashes ──► {TxHash}
//! ```
//!
//! [`LocalEnclave`] is an in-process implementation holding X25519 keys in
//! memory. Production deployments put a remote or hardware-backed enclave
//! behind the same trait.
//!
//! ## Wrong keys
//!
//! Receiving without an explicit recipient means trying every managed key
//! until one opens the payload. [`EnclaveError::is_wrong_key`] tells the
//! caller whether a failure means "try the next key" or "stop".

pub mod local;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{EncryptionError, PublicKey};
use crate::payload::{
    AffectedTransaction, EncodedPayload, Nonce, PrivacyGroupId, PrivacyMode, RecipientBox, TxHash,
};

pub use local::{Keyring, LocalEnclave};

/// Errors surfaced by an enclave.
#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("no private key held for {0}")]
    KeyNotFound(PublicKey),

    #[error("recipient box could not be opened")]
    DecryptionFailed,

    #[error("payload has no recipient box for the requested key")]
    MissingRecipientBox,

    #[error("payload has no recipient keys")]
    MissingRecipientKey,

    #[error("encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("enclave is not running")]
    Stopped,
}

impl EnclaveError {
    /// Whether the failure only means the chosen key cannot open the payload.
    ///
    /// Trial decryption moves on to the next managed key for these and aborts
    /// on everything else.
    pub fn is_wrong_key(&self) -> bool {
        match self {
            EnclaveError::KeyNotFound(_)
            | EnclaveError::DecryptionFailed
            | EnclaveError::MissingRecipientBox
            | EnclaveError::MissingRecipientKey => true,
            EnclaveError::Encryption(EncryptionError::DecryptFailed) => true,
            EnclaveError::Encryption(_) | EnclaveError::Stopped => false,
        }
    }
}

/// Enclave lifecycle as reported by [`Enclave::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnclaveStatus {
    Started,
    Stopped,
}

impl fmt::Display for EnclaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnclaveStatus::Started => f.write_str("STARTED"),
            EnclaveStatus::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// Privacy settings handed to the enclave when a payload is built.
#[derive(Debug, Clone, Default)]
pub struct PrivacyMetadata {
    pub privacy_mode: PrivacyMode,
    pub affected_transactions: Vec<AffectedTransaction>,
    pub exec_hash: Vec<u8>,
    pub mandatory_recipients: BTreeSet<PublicKey>,
    pub privacy_group_id: Option<PrivacyGroupId>,
}

/// A payload encrypted for its sender alone, waiting to be signed and sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub encrypted_payload: Vec<u8>,
    pub encrypted_key: Vec<u8>,
    pub nonce: Nonce,
    pub from: PublicKey,
}

/// The boundary around private key material.
pub trait Enclave: Send + Sync {
    /// Key used when a request names no sender.
    fn default_public_key(&self) -> PublicKey;

    /// Keys added as recipients to every outgoing transaction.
    fn forwarding_keys(&self) -> BTreeSet<PublicKey>;

    /// Keys whose private halves this enclave holds.
    fn public_keys(&self) -> BTreeSet<PublicKey>;

    /// Encrypt `message` from `sender` for `recipients`, in order.
    ///
    /// The resulting payload has one box per recipient, index-aligned with
    /// `recipient_keys`, and a security hash per affected transaction.
    fn encrypt_payload(
        &self,
        message: &[u8],
        sender: &PublicKey,
        recipients: &[PublicKey],
        metadata: &PrivacyMetadata,
    ) -> Result<EncodedPayload, EnclaveError>;

    /// Build a full payload from a previously stored raw transaction.
    fn encrypt_raw_transaction_payload(
        &self,
        raw: &RawTransaction,
        recipients: &[PublicKey],
        metadata: &PrivacyMetadata,
    ) -> Result<EncodedPayload, EnclaveError>;

    /// Encrypt `message` for `sender` only.
    fn encrypt_raw_payload(
        &self,
        message: &[u8],
        sender: &PublicKey,
    ) -> Result<RawTransaction, EnclaveError>;

    /// Decrypt a payload with one of our keys.
    fn unencrypt_transaction(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Vec<u8>, EnclaveError>;

    /// Decrypt a raw transaction.
    fn unencrypt_raw_payload(&self, raw: &RawTransaction) -> Result<Vec<u8>, EnclaveError>;

    /// Seal the payload's master key for an additional recipient.
    ///
    /// Only possible for payloads this enclave sent.
    fn create_new_recipient_box(
        &self,
        payload: &EncodedPayload,
        recipient: &PublicKey,
    ) -> Result<RecipientBox, EnclaveError>;

    /// Affected-map entries whose security hash does not verify. An entry
    /// whose affected transaction is not in `affected` counts as invalid.
    fn find_invalid_security_hashes(
        &self,
        payload: &EncodedPayload,
        affected: &[AffectedTransaction],
    ) -> Result<BTreeSet<TxHash>, EnclaveError>;

    fn status(&self) -> EnclaveStatus;
}
