//! Errors raised by the transaction core.

use thiserror::Error;

use super::publish::PublishError;
use crate::enclave::EnclaveError;
use crate::payload::{PayloadError, PrivacyMode, TxHash};
use crate::storage::DbError;

/// Everything a send, intake, or receive can fail with.
///
/// A payload silently discarded on intake is not an error; `store_payload`
/// returns its hash as usual.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Request or payload breaks the rules of its privacy mode.
    #[error("privacy violation: {0}")]
    PrivacyViolation(String),

    #[error("enhanced privacy is not enabled, cannot handle {0} transactions")]
    EnhancedPrivacyNotSupported(PrivacyMode),

    #[error("transaction {0} not found")]
    TransactionNotFound(TxHash),

    #[error("no suitable recipient key found to decrypt transaction {0}")]
    RecipientKeyNotFound(String),

    #[error("mandatory recipients not available for transaction {0}")]
    MandatoryRecipientsNotAvailable(TxHash),

    /// Two payloads sharing a hash disagree. Should never happen between
    /// honest nodes.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("enclave error: {0}")]
    Enclave(#[from] EnclaveError),

    #[error("storage error: {0}")]
    Db(#[from] DbError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
}

pub type TransactionResult<T> = Result<T, TransactionError>;
