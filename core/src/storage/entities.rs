//! Persistent record types.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::enclave::RawTransaction;
use crate::payload::{EncodedPayload, Nonce, TxHash};

/// The canonical stored view of one transaction.
///
/// Created on first sight of a hash. Later arrivals of the same hash replace
/// `payload` with a merged value; `hash` and `timestamp` never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTransaction {
    pub hash: TxHash,
    pub payload: EncodedPayload,
    /// Creation time, unix milliseconds.
    pub timestamp: i64,
}

impl EncryptedTransaction {
    pub fn new(hash: TxHash, payload: EncodedPayload) -> Self {
        Self {
            hash,
            payload,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Same record carrying a replacement payload.
    pub fn with_payload(self, payload: EncodedPayload) -> Self {
        Self { payload, ..self }
    }
}

/// A payload encrypted only for its sender, stored until it is signed and sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRawTransaction {
    pub hash: TxHash,
    pub encrypted_payload: Vec<u8>,
    pub encrypted_key: Vec<u8>,
    pub nonce: Nonce,
    pub sender: PublicKey,
    pub timestamp: i64,
}

impl EncryptedRawTransaction {
    pub fn new(hash: TxHash, raw: RawTransaction) -> Self {
        Self {
            hash,
            encrypted_payload: raw.encrypted_payload,
            encrypted_key: raw.encrypted_key,
            nonce: raw.nonce,
            sender: raw.from,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// The enclave-level view of this record.
    pub fn to_raw_transaction(&self) -> RawTransaction {
        RawTransaction {
            encrypted_payload: self.encrypted_payload.clone(),
            encrypted_key: self.encrypted_key.clone(),
            nonce: self.nonce.clone(),
            from: self.sender,
        }
    }
}
