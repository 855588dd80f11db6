//! Building and opening payloads without touching the transaction store.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::error::{TransactionError, TransactionResult};
use super::manager::{metadata_for, search_for_recipient_key, send_recipients};
use super::request::{ReceiveResponse, SendRequest};
use crate::crypto::PublicKey;
use crate::enclave::Enclave;
use crate::payload::EncodedPayload;
use crate::privacy::PrivacyHelper;

/// Creates payloads the way `send` does and decrypts payloads the way
/// `receive` does, for callers that handle persistence and delivery themselves.
pub struct EncodedPayloadManager {
    enclave: Arc<dyn Enclave>,
    privacy_helper: PrivacyHelper,
}

impl EncodedPayloadManager {
    pub fn new(enclave: Arc<dyn Enclave>, privacy_helper: PrivacyHelper) -> Self {
        Self {
            enclave,
            privacy_helper,
        }
    }

    pub fn create(&self, request: &SendRequest) -> TransactionResult<EncodedPayload> {
        let recipients = send_recipients(request, self.enclave.as_ref());

        let affected = self
            .privacy_helper
            .find_affected_contract_transactions_from_send_request(&request.affected_contract_transactions)?;
        self.privacy_helper.validate_send_request(
            request.privacy_mode,
            &recipients,
            &affected,
            &request.mandatory_recipients,
        )?;

        let payload = self.enclave.encrypt_payload(
            &request.payload,
            &request.sender,
            &recipients,
            &metadata_for(request, affected),
        )?;
        debug!(recipients = recipients.len(), "created payload");
        Ok(payload)
    }

    /// Decrypt with `recipient`, or with the first managed key that works.
    /// The response carries no managed parties.
    pub fn decrypt(
        &self,
        payload: &EncodedPayload,
        recipient: Option<PublicKey>,
    ) -> TransactionResult<ReceiveResponse> {
        let key = match recipient {
            Some(key) => key,
            None => search_for_recipient_key(self.enclave.as_ref(), payload)?.ok_or_else(|| {
                TransactionError::RecipientKeyNotFound("provided payload".to_string())
            })?,
        };
        let unencrypted_data = self.enclave.unencrypt_transaction(payload, &key)?;

        Ok(ReceiveResponse {
            unencrypted_data,
            privacy_mode: payload.privacy_mode,
            affected_transactions: payload.affected_hashes(),
            exec_hash: payload.exec_hash.clone(),
            managed_parties: BTreeSet::new(),
            sender: payload.sender_key,
            privacy_group_id: payload.privacy_group_id.clone(),
        })
    }
}
