//! Reconciling our own transactions when peers echo them back.
//!
//! After a node loses its store, peers that received its transactions can
//! send them back. Each echo carries only the peer's own box, so the sender
//! rebuilds its full view piece by piece: the first echo recreates the row
//! (with fresh boxes for every key that lacks one, the sender included),
//! later echoes add the boxes that are still missing.
//!
//! Every later echo must decrypt to the stored plaintext under the same
//! cipher text and privacy mode. PSV echoes must also name the stored
//! participants. Affected transactions an echo carries are folded into the
//! stored row.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::error::{TransactionError, TransactionResult};
use crate::crypto::PayloadDigest;
use crate::enclave::Enclave;
use crate::payload::{EncodedPayload, PrivacyMode, TxHash};
use crate::storage::{EncryptedTransaction, EncryptedTransactionStore};

/// Handles payloads whose sender is one of our own keys.
pub trait ResendManager: Send + Sync {
    fn accept_own_message(&self, payload: &EncodedPayload) -> TransactionResult<()>;
}

/// [`ResendManager`] that folds echoed payloads back into the store.
pub struct OwnMessageResender {
    store: Arc<dyn EncryptedTransactionStore>,
    enclave: Arc<dyn Enclave>,
    digest: Arc<dyn PayloadDigest>,
    lock: Mutex<()>,
}

impl OwnMessageResender {
    pub fn new(
        store: Arc<dyn EncryptedTransactionStore>,
        enclave: Arc<dyn Enclave>,
        digest: Arc<dyn PayloadDigest>,
    ) -> Self {
        Self {
            store,
            enclave,
            digest,
            lock: Mutex::new(()),
        }
    }

    /// Decrypt an echoed payload with its sender key.
    ///
    /// A PSV echo lists every recipient but carries one box, and the box
    /// belongs to the first key. It is decrypted as a plain single-box payload.
    fn decrypt_echo(&self, payload: &EncodedPayload) -> TransactionResult<Vec<u8>> {
        let view = match payload.privacy_mode {
            PrivacyMode::PrivateStateValidation => {
                let first_key = payload.recipient_keys.first().copied().ok_or_else(|| {
                    TransactionError::InvalidPayload("PSV payload without recipient keys".to_string())
                })?;
                let first_box = payload.recipient_boxes.first().cloned().ok_or_else(|| {
                    TransactionError::InvalidPayload("PSV payload without recipient boxes".to_string())
                })?;
                EncodedPayload {
                    privacy_mode: PrivacyMode::StandardPrivate,
                    exec_hash: Vec::new(),
                    recipient_keys: vec![first_key],
                    recipient_boxes: vec![first_box],
                    ..payload.clone()
                }
            }
            PrivacyMode::StandardPrivate
            | PrivacyMode::PartyProtection
            | PrivacyMode::MandatoryRecipients => payload.clone(),
        };

        Ok(self.enclave.unencrypt_transaction(&view, &payload.sender_key)?)
    }
}

impl ResendManager for OwnMessageResender {
    fn accept_own_message(&self, payload: &EncodedPayload) -> TransactionResult<()> {
        let _guard = self.lock.lock();

        let new_decrypted = self.decrypt_echo(payload)?;
        let hash = TxHash::new(self.digest.digest(&payload.cipher_text));

        let sender = payload.sender_key;
        if !self.enclave.public_keys().contains(&sender) {
            return Err(TransactionError::InvalidPayload(format!(
                "Message {hash} does not have one of the node's own keys as a sender"
            )));
        }

        let incoming_box = payload.recipient_boxes.first().ok_or_else(|| {
            TransactionError::InvalidPayload(format!("Message {hash} has no recipient box"))
        })?;

        match self.store.retrieve_by_hash(&hash)? {
            Some(stored) => {
                let existing = &stored.payload;

                let old_decrypted = self
                    .enclave
                    .unencrypt_transaction(existing, &existing.sender_key)?;
                if old_decrypted != new_decrypted
                    || existing.cipher_text != payload.cipher_text
                    || existing.privacy_mode != payload.privacy_mode
                {
                    return Err(TransactionError::InvalidPayload(format!(
                        "Invalid payload provided for {hash}"
                    )));
                }

                let mut recipient_keys = existing.recipient_keys.clone();
                let mut recipient_boxes = existing.recipient_boxes.clone();

                if existing.privacy_mode == PrivacyMode::PrivateStateValidation {
                    if payload.recipient_set() != existing.recipient_set() {
                        return Err(TransactionError::InvalidPayload(format!(
                            "Participants mismatch for two versions of transaction {hash}"
                        )));
                    }
                } else if let Some(incoming_key) = payload.recipient_keys.first() {
                    if !recipient_keys.contains(incoming_key) && !recipient_boxes.contains(incoming_box) {
                        recipient_keys.push(*incoming_key);
                        recipient_boxes.push(incoming_box.clone());
                        info!(tx_hash = %hash, recipient = %incoming_key, "added recipient to own message");
                    }
                }

                // Peers may know affected transactions the echo before them lacked.
                let mut affected_contract_transactions = existing.affected_contract_transactions.clone();
                affected_contract_transactions.extend(
                    payload
                        .affected_contract_transactions
                        .iter()
                        .map(|(tx, security)| (tx.clone(), security.clone())),
                );

                let merged = EncodedPayload {
                    recipient_keys,
                    recipient_boxes,
                    affected_contract_transactions,
                    ..existing.clone()
                };
                if merged == *existing {
                    debug!(tx_hash = %hash, "own message already up to date");
                    return Ok(());
                }
                self.store.update(&stored.clone().with_payload(merged))?;
            }
            None => {
                let mut recipient_keys = payload.recipient_keys.clone();
                if !recipient_keys.contains(&sender) {
                    recipient_keys.push(sender);
                }

                let mut recipient_boxes = payload.recipient_boxes.clone();
                for recipient in recipient_keys.iter().skip(recipient_boxes.len()) {
                    recipient_boxes.push(self.enclave.create_new_recipient_box(payload, recipient)?);
                }

                let rebuilt = EncodedPayload {
                    recipient_keys,
                    recipient_boxes,
                    ..payload.clone()
                };
                self.store.save(&EncryptedTransaction::new(hash.clone(), rebuilt))?;
                info!(tx_hash = %hash, "rebuilt own message from echo");
            }
        }

        Ok(())
    }
}
