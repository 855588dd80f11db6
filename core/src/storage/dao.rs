//! Store interfaces consumed by the transaction core.
//!
//! Every method is atomic for the single row it touches. Nothing here spans
//! rows; the merge path serialises its own read-modify-write cycle.

use std::error::Error;

use super::db::DbResult;
use super::entities::{EncryptedRawTransaction, EncryptedTransaction};
use crate::crypto::PublicKey;
use crate::payload::TxHash;

/// Error type a commit hook may fail with.
pub type CommitHookError = Box<dyn Error + Send + Sync>;

/// Durable map from transaction hash to the canonical payload.
pub trait EncryptedTransactionStore: Send + Sync {
    /// Insert a new row. Fails with `AlreadyExists` if the hash is taken.
    fn save(&self, tx: &EncryptedTransaction) -> DbResult<()>;

    /// Insert a new row, then run `on_commit`.
    ///
    /// If the hook fails the row is removed again and the hook's error is
    /// returned as `DbError::CommitHook`. If the insert fails the hook never
    /// runs.
    fn save_with_callback(
        &self,
        tx: &EncryptedTransaction,
        on_commit: &dyn Fn() -> Result<(), CommitHookError>,
    ) -> DbResult<()>;

    /// Replace the payload of an existing row. Fails with `NotFound` if the
    /// row is absent.
    fn update(&self, tx: &EncryptedTransaction) -> DbResult<()>;

    fn retrieve_by_hash(&self, hash: &TxHash) -> DbResult<Option<EncryptedTransaction>>;

    /// Rows for whichever of `hashes` are present, in request order.
    fn find_by_hashes(&self, hashes: &[TxHash]) -> DbResult<Vec<EncryptedTransaction>>;

    /// Remove a row. Fails with `NotFound` if the row is absent.
    fn delete(&self, hash: &TxHash) -> DbResult<()>;

    /// Remove every row sent by or addressed to `key`. Returns how many went.
    fn delete_all(&self, key: &PublicKey) -> DbResult<usize>;

    fn transaction_count(&self) -> usize;

    fn upcheck(&self) -> bool;
}

/// Storage for payloads that have been encrypted but not yet sent.
pub trait EncryptedRawTransactionStore: Send + Sync {
    /// Insert or replace a raw transaction.
    fn save_raw(&self, tx: &EncryptedRawTransaction) -> DbResult<()>;

    fn retrieve_raw_by_hash(&self, hash: &TxHash) -> DbResult<Option<EncryptedRawTransaction>>;

    /// Remove a raw transaction, returning whether it existed.
    fn delete_raw(&self, hash: &TxHash) -> DbResult<bool>;

    fn upcheck_raw(&self) -> bool;
}
