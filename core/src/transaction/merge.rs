//! Merging a newly arrived partial payload into the stored one.
//!
//! Each peer publishes a payload carrying exactly one recipient box (its
//! recipient's). A node that is the recipient under several keys, or that
//! receives the same transaction from several paths, sees the same hash
//! more than once and folds every box into one record:
//!
//! ```text
//!   stored:    keys [B]      boxes [b]
//!   incoming:  keys [C]      boxes [c]
//!   merged:    keys [C, B]   boxes [c, b]
//! ```
//!
//! Boxes are compared by value, so redelivery is a no-op and the final set
//! of (key, box) pairs does not depend on arrival order.

use super::error::{TransactionError, TransactionResult};
use crate::payload::EncodedPayload;

/// Fold `incoming` into `existing`.
///
/// Returns `Ok(None)` when the incoming box is already stored.
pub fn merge_recipient(
    existing: &EncodedPayload,
    incoming: &EncodedPayload,
) -> TransactionResult<Option<EncodedPayload>> {
    ensure_same_transaction(existing, incoming)?;

    let new_box = incoming.recipient_boxes.first().ok_or_else(|| {
        TransactionError::IntegrityViolation("incoming payload has no recipient box".to_string())
    })?;

    if existing.recipient_boxes.contains(new_box) {
        return Ok(None);
    }

    let mut recipient_boxes = Vec::with_capacity(existing.recipient_boxes.len() + 1);
    recipient_boxes.push(new_box.clone());
    recipient_boxes.extend(existing.recipient_boxes.iter().cloned());

    // Legacy payloads carry no keys and fall through both branches.
    let recipient_keys = if incoming.privacy_mode.is_psv() {
        let new_recipient = incoming.recipient_keys.first().ok_or_else(|| {
            TransactionError::IntegrityViolation("expected recipient not found".to_string())
        })?;
        if !existing.recipient_keys.contains(new_recipient) {
            return Err(TransactionError::IntegrityViolation(
                "expected recipient not found".to_string(),
            ));
        }
        let mut keys = Vec::with_capacity(existing.recipient_keys.len());
        keys.push(*new_recipient);
        keys.extend(existing.recipient_keys.iter().filter(|key| *key != new_recipient));
        keys
    } else if let Some(new_recipient) = incoming.recipient_keys.first() {
        let mut keys = Vec::with_capacity(existing.recipient_keys.len() + 1);
        keys.push(*new_recipient);
        keys.extend(existing.recipient_keys.iter().copied());
        keys
    } else {
        existing.recipient_keys.clone()
    };

    Ok(Some(EncodedPayload {
        recipient_boxes,
        recipient_keys,
        ..existing.clone()
    }))
}

/// Everything except the recipient fields must match exactly.
fn ensure_same_transaction(
    existing: &EncodedPayload,
    incoming: &EncodedPayload,
) -> TransactionResult<()> {
    let mismatch = [
        ("cipher text", existing.cipher_text == incoming.cipher_text),
        ("cipher text nonce", existing.cipher_text_nonce == incoming.cipher_text_nonce),
        ("sender key", existing.sender_key == incoming.sender_key),
        ("recipient nonce", existing.recipient_nonce == incoming.recipient_nonce),
        ("privacy mode", existing.privacy_mode == incoming.privacy_mode),
        ("exec hash", existing.exec_hash == incoming.exec_hash),
        (
            "affected contract transactions",
            existing.affected_contract_transactions == incoming.affected_contract_transactions,
        ),
    ]
    .into_iter()
    .find(|(_, matches)| !matches);

    match mismatch {
        Some((field, _)) => Err(TransactionError::IntegrityViolation(format!(
            "Invalid existing transaction: {field} differs"
        ))),
        None => Ok(()),
    }
}
