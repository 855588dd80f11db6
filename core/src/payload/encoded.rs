//! # Encoded Payloads
//!
//! The unit exchanged between nodes and kept in the store.
//!
//! ```text
//!   EncodedPayload
//!   ├── sender_key
//!   ├── cipher_text, cipher_text_nonce        opaque to everything but the enclave
//!   ├── recipient_keys[i] ◄──► recipient_boxes[i]
//!   ├── recipient_nonce                       shared by all boxes
//!   └── privacy metadata                      mode, affected map, exec hash,
//!                                             mandatory recipients, group id
//! ```
//!
//! Payloads are values. Anything that "changes" a payload builds a new one
//! with struct-update syntax and leaves the original untouched.
//!
//! Legacy payloads carry boxes but no recipient keys. They stay that way:
//! nothing in the merge path ever invents keys for them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Nonce, PrivacyGroupId, PrivacyMode, RecipientBox, SecurityHash, TxHash};
use crate::crypto::PublicKey;

/// Errors raised while reshaping or decoding payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("recipient {0} is not a recipient of this payload")]
    InvalidRecipient(PublicKey),

    #[error("payload has {keys} recipient keys but {boxes} boxes")]
    MisalignedRecipients { keys: usize, boxes: usize },

    #[error("unknown privacy mode: {0}")]
    UnknownPrivacyMode(String),

    #[error("payload encoding error: {0}")]
    Encoding(String),
}

/// An encrypted transaction payload with per-recipient boxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    pub sender_key: PublicKey,
    pub cipher_text: Vec<u8>,
    pub cipher_text_nonce: Nonce,
    pub recipient_boxes: Vec<RecipientBox>,
    pub recipient_nonce: Nonce,
    pub recipient_keys: Vec<PublicKey>,
    pub privacy_mode: PrivacyMode,
    pub affected_contract_transactions: BTreeMap<TxHash, SecurityHash>,
    pub exec_hash: Vec<u8>,
    pub mandatory_recipients: BTreeSet<PublicKey>,
    pub privacy_group_id: Option<PrivacyGroupId>,
}

impl EncodedPayload {
    /// Payload from before recipient keys were recorded alongside boxes.
    pub fn is_legacy(&self) -> bool {
        self.recipient_keys.is_empty()
    }

    /// Recipient keys as a set, for set-equality checks.
    pub fn recipient_set(&self) -> BTreeSet<PublicKey> {
        self.recipient_keys.iter().copied().collect()
    }

    /// Hashes of the declared affected transactions.
    pub fn affected_hashes(&self) -> BTreeSet<TxHash> {
        self.affected_contract_transactions.keys().cloned().collect()
    }

    /// Bincode encoding, the format payloads travel in between nodes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        bincode::serialize(self).map_err(|e| PayloadError::Encoding(e.to_string()))
    }

    /// Decode a payload produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        bincode::deserialize(bytes).map_err(|e| PayloadError::Encoding(e.to_string()))
    }

    /// The view of this payload that gets published to one recipient.
    ///
    /// The recipient gets only its own box. Under private state validation
    /// every recipient must be able to check recipient sets, so the full key
    /// list is kept with the recipient moved to the front. In every other
    /// mode only the recipient's own key is kept.
    pub fn for_recipient(&self, recipient: &PublicKey) -> Result<EncodedPayload, PayloadError> {
        let index = self
            .recipient_keys
            .iter()
            .position(|key| key == recipient)
            .ok_or(PayloadError::InvalidRecipient(*recipient))?;

        let recipient_box = self.recipient_boxes.get(index).cloned().ok_or(
            PayloadError::MisalignedRecipients {
                keys: self.recipient_keys.len(),
                boxes: self.recipient_boxes.len(),
            },
        )?;

        let recipient_keys = if self.privacy_mode.is_psv() {
            let mut keys = Vec::with_capacity(self.recipient_keys.len());
            keys.push(*recipient);
            keys.extend(self.recipient_keys.iter().filter(|key| *key != recipient));
            keys
        } else {
            vec![*recipient]
        };

        Ok(EncodedPayload {
            recipient_boxes: vec![recipient_box],
            recipient_keys,
            ..self.clone()
        })
    }

    /// Returns the box aligned with `key`, if the payload records keys.
    pub fn box_for(&self, key: &PublicKey) -> Option<&RecipientBox> {
        self.recipient_keys
            .iter()
            .position(|k| k == key)
            .and_then(|index| self.recipient_boxes.get(index))
    }
}

/// A stored transaction referenced by another transaction's privacy metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedTransaction {
    pub hash: TxHash,
    pub payload: EncodedPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    // -- Helpers ------------------------------------------------------------

    fn key() -> PublicKey {
        KeyPair::generate().public_key()
    }

    fn three_party_payload(mode: PrivacyMode) -> (EncodedPayload, [PublicKey; 3]) {
        let keys = [key(), key(), key()];
        let payload = EncodedPayload {
            sender_key: keys[0],
            cipher_text: b"cipher".to_vec(),
            cipher_text_nonce: Nonce::new(vec![1; 12]),
            recipient_boxes: vec![
                RecipientBox::new(b"box-a".to_vec()),
                RecipientBox::new(b"box-b".to_vec()),
                RecipientBox::new(b"box-c".to_vec()),
            ],
            recipient_nonce: Nonce::new(vec![2; 12]),
            recipient_keys: keys.to_vec(),
            privacy_mode: mode,
            exec_hash: if mode.is_psv() { b"exec".to_vec() } else { Vec::new() },
            ..Default::default()
        };
        (payload, keys)
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn for_recipient_strips_to_single_key_and_box() {
        let (payload, keys) = three_party_payload(PrivacyMode::StandardPrivate);
        let stripped = payload.for_recipient(&keys[1]).unwrap();

        assert_eq!(stripped.recipient_keys, vec![keys[1]]);
        assert_eq!(stripped.recipient_boxes, vec![RecipientBox::new(b"box-b".to_vec())]);
        assert_eq!(stripped.cipher_text, payload.cipher_text);
    }

    #[test]
    fn for_recipient_keeps_all_keys_under_psv() {
        let (payload, keys) = three_party_payload(PrivacyMode::PrivateStateValidation);
        let stripped = payload.for_recipient(&keys[2]).unwrap();

        assert_eq!(stripped.recipient_keys, vec![keys[2], keys[0], keys[1]]);
        assert_eq!(stripped.recipient_boxes, vec![RecipientBox::new(b"box-c".to_vec())]);
        assert_eq!(stripped.exec_hash, b"exec".to_vec());
    }

    #[test]
    fn for_recipient_rejects_strangers() {
        let (payload, _) = three_party_payload(PrivacyMode::StandardPrivate);
        let stranger = key();
        assert!(matches!(
            payload.for_recipient(&stranger),
            Err(PayloadError::InvalidRecipient(k)) if k == stranger
        ));
    }

    #[test]
    fn legacy_payload_cannot_be_stripped_by_key() {
        let (payload, keys) = three_party_payload(PrivacyMode::StandardPrivate);
        let legacy = EncodedPayload {
            recipient_keys: Vec::new(),
            ..payload
        };
        assert!(legacy.is_legacy());
        assert!(legacy.for_recipient(&keys[0]).is_err());
    }

    #[test]
    fn misaligned_payload_is_reported() {
        let (payload, keys) = three_party_payload(PrivacyMode::StandardPrivate);
        let short = EncodedPayload {
            recipient_boxes: payload.recipient_boxes[..1].to_vec(),
            ..payload
        };
        assert!(matches!(
            short.for_recipient(&keys[2]),
            Err(PayloadError::MisalignedRecipients { keys: 3, boxes: 1 })
        ));
    }

    #[test]
    fn bincode_encoding_preserves_payload() {
        let (mut payload, keys) = three_party_payload(PrivacyMode::MandatoryRecipients);
        payload.mandatory_recipients.insert(keys[1]);
        payload
            .affected_contract_transactions
            .insert(TxHash::new(vec![9; 64]), SecurityHash::new(vec![8; 64]));
        payload.privacy_group_id = Some(PrivacyGroupId::new(b"group".to_vec()));

        let decoded = EncodedPayload::from_bytes(&payload.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }
}
