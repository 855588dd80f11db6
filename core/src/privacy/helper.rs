//! Privacy-mode rules for outgoing requests and incoming payloads.
//!
//! ## Outgoing vs incoming
//!
//! A send that breaks a rule is the caller's mistake and fails outright.
//! An incoming payload that breaks a rule may simply be one this node cannot
//! judge yet (an affected transaction it has not seen), so most failures
//! there are soft: `validate_payload` returns `false` and the payload is
//! dropped. The exception is a recipient-set mismatch under private state
//! validation, which points at tampering and fails hard.
//!
//! | Check                                  | send            | intake          |
//! |----------------------------------------|-----------------|-----------------|
//! | enhanced mode without the switch       | hard            | hard            |
//! | recipients ⊉ mandatory recipients      | hard            | n/a             |
//! | affected tx with another mode          | hard            | soft            |
//! | affected mandatory set not nested      | hard            | soft            |
//! | PSV: unresolved affected tx            | hard (lookup)   | soft            |
//! | PSV: sender not an affected recipient  | n/a             | soft            |
//! | PSV: recipient sets differ             | hard            | hard            |

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::crypto::PublicKey;
use crate::payload::{AffectedTransaction, EncodedPayload, PrivacyMode, TxHash};
use crate::storage::{EncryptedTransaction, EncryptedTransactionStore};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Stateless policy engine. Holds a store handle for affected-transaction
/// lookups and the enhanced-privacy switch, nothing else.
#[derive(Clone)]
pub struct PrivacyHelper {
    store: Arc<dyn EncryptedTransactionStore>,
    enhanced_privacy_enabled: bool,
}

impl PrivacyHelper {
    pub fn new(store: Arc<dyn EncryptedTransactionStore>, enhanced_privacy_enabled: bool) -> Self {
        Self {
            store,
            enhanced_privacy_enabled,
        }
    }

    pub fn enhanced_privacy_enabled(&self) -> bool {
        self.enhanced_privacy_enabled
    }

    /// Resolve the affected transactions named by a send request.
    ///
    /// Every hash must be known; a single unknown one fails the whole lookup.
    pub fn find_affected_contract_transactions_from_send_request(
        &self,
        hashes: &[TxHash],
    ) -> TransactionResult<Vec<AffectedTransaction>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.store.find_by_hashes(&dedup(hashes))?;
        let found_hashes: BTreeSet<&TxHash> = found.iter().map(|tx| &tx.hash).collect();

        if let Some(missing) = hashes.iter().find(|hash| !found_hashes.contains(hash)) {
            return Err(TransactionError::PrivacyViolation(format!(
                "Unable to find affectedContractTransaction {missing}"
            )));
        }

        Ok(found.into_iter().map(to_affected).collect())
    }

    /// Resolve the affected transactions declared by an incoming payload.
    ///
    /// Unknown hashes are skipped. Validation decides what that means.
    pub fn find_affected_contract_transactions_from_payload(
        &self,
        payload: &EncodedPayload,
    ) -> TransactionResult<Vec<AffectedTransaction>> {
        if payload.affected_contract_transactions.is_empty() {
            return Ok(Vec::new());
        }

        let hashes: Vec<TxHash> = payload.affected_contract_transactions.keys().cloned().collect();
        let found = self.store.find_by_hashes(&hashes)?;

        if found.len() != hashes.len() {
            let found_hashes: BTreeSet<&TxHash> = found.iter().map(|tx| &tx.hash).collect();
            for missing in hashes.iter().filter(|hash| !found_hashes.contains(hash)) {
                debug!(affected = %missing, "unable to find affectedContractTransaction");
            }
        }

        Ok(found.into_iter().map(to_affected).collect())
    }

    /// Check a send request against its privacy mode and affected transactions.
    pub fn validate_send_request(
        &self,
        mode: PrivacyMode,
        recipients: &[PublicKey],
        affected: &[AffectedTransaction],
        mandatory_recipients: &BTreeSet<PublicKey>,
    ) -> TransactionResult<()> {
        self.ensure_mode_supported(mode)?;

        match mode {
            PrivacyMode::MandatoryRecipients => {
                let recipient_set: BTreeSet<&PublicKey> = recipients.iter().collect();
                if let Some(missing) = mandatory_recipients
                    .iter()
                    .find(|key| !recipient_set.contains(key))
                {
                    return Err(TransactionError::PrivacyViolation(format!(
                        "One or more mandatory recipients not included in the participant list: {missing}"
                    )));
                }
            }
            PrivacyMode::PrivateStateValidation => {
                if let Some(mismatch) = first_recipient_mismatch(recipients, affected) {
                    return Err(TransactionError::PrivacyViolation(format!(
                        "Recipients mismatched for Affected Txn {}",
                        mismatch.hash
                    )));
                }
            }
            PrivacyMode::StandardPrivate | PrivacyMode::PartyProtection => {}
        }

        if let Some(mismatch) = affected.iter().find(|a| a.payload.privacy_mode != mode) {
            return Err(TransactionError::PrivacyViolation(format!(
                "Privacy metadata mismatched with Affected Txn {}",
                mismatch.hash
            )));
        }

        if let Some(mismatch) = affected
            .iter()
            .find(|a| !a.payload.mandatory_recipients.is_subset(mandatory_recipients))
        {
            return Err(TransactionError::PrivacyViolation(format!(
                "Privacy metadata mismatched with Affected Txn {}",
                mismatch.hash
            )));
        }

        Ok(())
    }

    /// Decide whether an incoming payload should be stored.
    ///
    /// `Ok(false)` means drop it quietly. Errors are reserved for payloads
    /// that must not be accepted under any circumstances.
    pub fn validate_payload(
        &self,
        tx_hash: &TxHash,
        payload: &EncodedPayload,
        affected: &[AffectedTransaction],
    ) -> TransactionResult<bool> {
        let mode = payload.privacy_mode;
        self.ensure_mode_supported(mode)?;

        if let Some(a) = affected.iter().find(|a| a.payload.privacy_mode != mode) {
            info!(
                tx_hash = %tx_hash,
                affected = %a.hash,
                affected_mode = %a.payload.privacy_mode,
                mode = %mode,
                "affected transaction has a different privacy mode, ignoring transaction"
            );
            return Ok(false);
        }

        if let Some(a) = affected
            .iter()
            .find(|a| !a.payload.mandatory_recipients.is_subset(&payload.mandatory_recipients))
        {
            info!(
                tx_hash = %tx_hash,
                affected = %a.hash,
                "affected transaction has mandatory recipients outside this transaction's set, ignoring transaction"
            );
            return Ok(false);
        }

        if mode.is_psv() {
            if affected.len() != payload.affected_contract_transactions.len() {
                info!(tx_hash = %tx_hash, "not all affected transactions were found, ignoring transaction");
                return Ok(false);
            }

            let sender = &payload.sender_key;
            if let Some(a) = affected
                .iter()
                .find(|a| !a.payload.recipient_keys.contains(sender))
            {
                info!(
                    tx_hash = %tx_hash,
                    sender = %sender,
                    affected = %a.hash,
                    "sender is not a recipient of affected transaction, ignoring transaction"
                );
                return Ok(false);
            }

            if let Some(mismatch) = first_recipient_mismatch(&payload.recipient_keys, affected) {
                return Err(TransactionError::PrivacyViolation(format!(
                    "Recipients mismatched for Affected Txn {}",
                    mismatch.hash
                )));
            }
        }

        Ok(true)
    }

    /// Drop affected-map entries whose security hashes did not verify.
    ///
    /// Not allowed under private state validation, where every affected
    /// transaction has to check out.
    pub fn sanitise_privacy_payload(
        &self,
        tx_hash: &TxHash,
        payload: &EncodedPayload,
        invalid: &BTreeSet<TxHash>,
    ) -> TransactionResult<EncodedPayload> {
        let invalid_list = invalid
            .iter()
            .map(TxHash::to_string)
            .collect::<Vec<_>>()
            .join(",");

        if payload.privacy_mode.is_psv() {
            return Err(TransactionError::PrivacyViolation(format!(
                "Invalid security hashes identified for PSC TX {tx_hash}. Invalid ACOTHs: {invalid_list}"
            )));
        }

        let affected_contract_transactions = payload
            .affected_contract_transactions
            .iter()
            .filter(|(hash, _)| !invalid.contains(*hash))
            .map(|(hash, security_hash)| (hash.clone(), security_hash.clone()))
            .collect();

        debug!(
            tx_hash = %tx_hash,
            invalid = %invalid_list,
            "discarded invalid security hashes"
        );

        Ok(EncodedPayload {
            affected_contract_transactions,
            ..payload.clone()
        })
    }

    fn ensure_mode_supported(&self, mode: PrivacyMode) -> TransactionResult<()> {
        if mode.requires_enhanced_privacy() && !self.enhanced_privacy_enabled {
            return Err(TransactionError::EnhancedPrivacyNotSupported(mode));
        }
        Ok(())
    }
}

fn to_affected(tx: EncryptedTransaction) -> AffectedTransaction {
    AffectedTransaction {
        hash: tx.hash,
        payload: tx.payload,
    }
}

fn dedup(hashes: &[TxHash]) -> Vec<TxHash> {
    let mut seen = BTreeSet::new();
    hashes
        .iter()
        .filter(|hash| seen.insert((*hash).clone()))
        .cloned()
        .collect()
}

/// First affected transaction whose recipient set differs from `recipients`.
fn first_recipient_mismatch<'a>(
    recipients: &[PublicKey],
    affected: &'a [AffectedTransaction],
) -> Option<&'a AffectedTransaction> {
    let expected: BTreeSet<PublicKey> = recipients.iter().copied().collect();
    affected.iter().find(|a| a.payload.recipient_set() != expected)
}
