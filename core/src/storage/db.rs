//! # SledStore — Persistent Transaction Storage
//!
//! Both transaction stores on top of sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree               | Key          | Value                             |
//! |--------------------|--------------|-----------------------------------|
//! | `transactions`     | hash bytes   | `bincode(EncryptedTransaction)`   |
//! | `raw_transactions` | hash bytes   | `bincode(EncryptedRawTransaction)`|
//!
//! ## Atomicity
//!
//! A new row is written with `compare_and_swap(key, None, value)`, so two
//! racing inserts of the same hash cannot both succeed. Updates are single
//! `insert`s. No operation spans more than one key.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use tracing::{debug, info, warn};

use super::dao::{CommitHookError, EncryptedRawTransactionStore, EncryptedTransactionStore};
use super::entities::{EncryptedRawTransaction, EncryptedTransaction};
use crate::crypto::PublicKey;
use crate::payload::TxHash;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error("commit hook failed: {0}")]
    CommitHook(#[source] CommitHookError),
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// sled-backed implementation of both transaction stores.
///
/// # Thread Safety
///
/// sled trees support concurrent readers and serialised writers, so a
/// `SledStore` is shared across threads as `Arc<SledStore>` without any
/// extra locking.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    transactions: Tree,
    raw_transactions: Tree,
}

impl SledStore {
    /// Open or create a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let transactions = db.open_tree("transactions")?;
        let raw_transactions = db.open_tree("raw_transactions")?;

        Ok(Self {
            db,
            transactions,
            raw_transactions,
        })
    }

    /// Number of stored raw transactions.
    pub fn raw_transaction_count(&self) -> usize {
        self.raw_transactions.len()
    }

    /// Every stored transaction, in hash order.
    pub fn retrieve_all(&self) -> DbResult<Vec<EncryptedTransaction>> {
        self.transactions
            .iter()
            .values()
            .map(|value| decode(&value?))
            .collect()
    }

    /// Block until all pending writes are on disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn insert_if_absent(&self, key: &[u8], value: Vec<u8>) -> DbResult<()> {
        self.transactions
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
            .map_err(|_| DbError::AlreadyExists(hex::encode(key)))
    }
}

impl EncryptedTransactionStore for SledStore {
    fn save(&self, tx: &EncryptedTransaction) -> DbResult<()> {
        self.insert_if_absent(tx.hash.as_bytes(), encode(tx)?)?;
        info!(tx_hash = %tx.hash, "stored transaction");
        Ok(())
    }

    fn save_with_callback(
        &self,
        tx: &EncryptedTransaction,
        on_commit: &dyn Fn() -> Result<(), CommitHookError>,
    ) -> DbResult<()> {
        let key = tx.hash.as_bytes();
        self.insert_if_absent(key, encode(tx)?)?;

        if let Err(e) = on_commit() {
            warn!(tx_hash = %tx.hash, error = %e, "commit hook failed, removing row");
            self.transactions.remove(key)?;
            return Err(DbError::CommitHook(e));
        }

        info!(tx_hash = %tx.hash, "stored transaction");
        Ok(())
    }

    fn update(&self, tx: &EncryptedTransaction) -> DbResult<()> {
        let key = tx.hash.as_bytes();
        if !self.transactions.contains_key(key)? {
            return Err(DbError::NotFound(tx.hash.to_string()));
        }
        self.transactions.insert(key, encode(tx)?)?;
        info!(
            tx_hash = %tx.hash,
            boxes = tx.payload.recipient_boxes.len(),
            "updated transaction"
        );
        Ok(())
    }

    fn retrieve_by_hash(&self, hash: &TxHash) -> DbResult<Option<EncryptedTransaction>> {
        match self.transactions.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find_by_hashes(&self, hashes: &[TxHash]) -> DbResult<Vec<EncryptedTransaction>> {
        let mut found = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(tx) = self.retrieve_by_hash(hash)? {
                found.push(tx);
            }
        }
        Ok(found)
    }

    fn delete(&self, hash: &TxHash) -> DbResult<()> {
        match self.transactions.remove(hash.as_bytes())? {
            Some(_) => {
                info!(tx_hash = %hash, "deleted transaction");
                Ok(())
            }
            None => Err(DbError::NotFound(hash.to_string())),
        }
    }

    fn delete_all(&self, key: &PublicKey) -> DbResult<usize> {
        let mut doomed = Vec::new();
        for entry in self.transactions.iter() {
            let (row_key, value) = entry?;
            let tx: EncryptedTransaction = decode(&value)?;
            if tx.payload.sender_key == *key || tx.payload.recipient_keys.contains(key) {
                doomed.push(row_key);
            }
        }

        for row_key in &doomed {
            self.transactions.remove(row_key)?;
        }
        info!(key = %key, removed = doomed.len(), "deleted transactions for key");
        Ok(doomed.len())
    }

    fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn upcheck(&self) -> bool {
        self.transactions.first().is_ok()
    }
}

impl EncryptedRawTransactionStore for SledStore {
    fn save_raw(&self, tx: &EncryptedRawTransaction) -> DbResult<()> {
        self.raw_transactions.insert(tx.hash.as_bytes(), encode(tx)?)?;
        debug!(tx_hash = %tx.hash, "stored raw transaction");
        Ok(())
    }

    fn retrieve_raw_by_hash(&self, hash: &TxHash) -> DbResult<Option<EncryptedRawTransaction>> {
        match self.raw_transactions.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete_raw(&self, hash: &TxHash) -> DbResult<bool> {
        Ok(self.raw_transactions.remove(hash.as_bytes())?.is_some())
    }

    fn upcheck_raw(&self) -> bool {
        self.raw_transactions.first().is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::crypto::KeyPair;
    use crate::enclave::RawTransaction;
    use crate::payload::{EncodedPayload, Nonce, RecipientBox};

    // -- Helpers ------------------------------------------------------------

    fn make_tx(hash_byte: u8, sender: PublicKey, recipients: Vec<PublicKey>) -> EncryptedTransaction {
        let payload = EncodedPayload {
            sender_key: sender,
            cipher_text: vec![hash_byte; 16],
            recipient_boxes: recipients
                .iter()
                .map(|_| RecipientBox::new(vec![hash_byte; 48]))
                .collect(),
            recipient_keys: recipients,
            ..Default::default()
        };
        EncryptedTransaction::new(TxHash::new(vec![hash_byte; 64]), payload)
    }

    fn key() -> PublicKey {
        KeyPair::generate().public_key()
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn open_temporary_store() {
        let store = SledStore::open_temporary().expect("should create temp store");
        assert_eq!(store.transaction_count(), 0);
        assert_eq!(store.raw_transaction_count(), 0);
        assert!(store.upcheck());
        assert!(store.upcheck_raw());
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tx = make_tx(1, key(), vec![key()]);
        {
            let store = SledStore::open(dir.path()).expect("should open store");
            store.save(&tx).unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(dir.path()).expect("should reopen store");
        assert_eq!(store.retrieve_by_hash(&tx.hash).unwrap(), Some(tx));
    }

    #[test]
    fn save_rejects_existing_hash() {
        let store = SledStore::open_temporary().unwrap();
        let tx = make_tx(1, key(), vec![key()]);

        store.save(&tx).unwrap();
        let err = store.save(&tx).unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));
        assert_eq!(store.transaction_count(), 1);
    }

    #[test]
    fn commit_hook_runs_after_insert() {
        let store = SledStore::open_temporary().unwrap();
        let tx = make_tx(2, key(), vec![key()]);

        let hook = || -> Result<(), CommitHookError> {
            assert!(store.retrieve_by_hash(&tx.hash).unwrap().is_some());
            Ok(())
        };
        store.save_with_callback(&tx, &hook).unwrap();
        assert!(store.retrieve_by_hash(&tx.hash).unwrap().is_some());
    }

    #[test]
    fn failed_commit_hook_rolls_back() {
        let store = SledStore::open_temporary().unwrap();
        let tx = make_tx(3, key(), vec![key()]);

        let hook = || -> Result<(), CommitHookError> {
            Err(io::Error::new(io::ErrorKind::Other, "publish failed").into())
        };
        let err = store.save_with_callback(&tx, &hook).unwrap_err();

        assert!(matches!(err, DbError::CommitHook(_)));
        assert!(store.retrieve_by_hash(&tx.hash).unwrap().is_none());
    }

    #[test]
    fn commit_hook_skipped_when_insert_fails() {
        let store = SledStore::open_temporary().unwrap();
        let tx = make_tx(4, key(), vec![key()]);
        store.save(&tx).unwrap();

        let hook = || -> Result<(), CommitHookError> { panic!("hook must not run") };
        assert!(store.save_with_callback(&tx, &hook).is_err());
    }

    #[test]
    fn update_replaces_payload_and_keeps_timestamp() {
        let store = SledStore::open_temporary().unwrap();
        let tx = make_tx(5, key(), vec![key()]);
        store.save(&tx).unwrap();

        let mut payload = tx.payload.clone();
        payload.recipient_boxes.push(RecipientBox::new(vec![0xAB; 48]));
        let updated = tx.clone().with_payload(payload);
        store.update(&updated).unwrap();

        let stored = store.retrieve_by_hash(&tx.hash).unwrap().unwrap();
        assert_eq!(stored.payload.recipient_boxes.len(), 2);
        assert_eq!(stored.timestamp, tx.timestamp);
    }

    #[test]
    fn update_of_missing_row_fails() {
        let store = SledStore::open_temporary().unwrap();
        let err = store.update(&make_tx(6, key(), vec![])).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn find_by_hashes_skips_missing() {
        let store = SledStore::open_temporary().unwrap();
        let a = make_tx(7, key(), vec![key()]);
        let b = make_tx(8, key(), vec![key()]);
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        let found = store
            .find_by_hashes(&[b.hash.clone(), TxHash::new(vec![0; 64]), a.hash.clone()])
            .unwrap();
        assert_eq!(found, vec![b, a]);
    }

    #[test]
    fn delete_removes_row_once() {
        let store = SledStore::open_temporary().unwrap();
        let tx = make_tx(9, key(), vec![key()]);
        store.save(&tx).unwrap();

        store.delete(&tx.hash).unwrap();
        assert!(matches!(store.delete(&tx.hash), Err(DbError::NotFound(_))));
    }

    #[test]
    fn delete_all_matches_sender_and_recipients() {
        let store = SledStore::open_temporary().unwrap();
        let target = key();
        let other = key();

        store.save(&make_tx(10, target, vec![other])).unwrap();
        store.save(&make_tx(11, other, vec![target, other])).unwrap();
        store.save(&make_tx(12, other, vec![other])).unwrap();

        assert_eq!(store.delete_all(&target).unwrap(), 2);
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(store.retrieve_all().unwrap()[0].hash, TxHash::new(vec![12; 64]));
    }

    #[test]
    fn raw_transactions_round_trip() {
        let store = SledStore::open_temporary().unwrap();
        let raw = RawTransaction {
            encrypted_payload: vec![1, 2, 3],
            encrypted_key: vec![4, 5, 6],
            nonce: Nonce::new(vec![7; 12]),
            from: key(),
        };
        let record = EncryptedRawTransaction::new(TxHash::new(vec![13; 64]), raw.clone());

        store.save_raw(&record).unwrap();
        let stored = store.retrieve_raw_by_hash(&record.hash).unwrap().unwrap();
        assert_eq!(stored.to_raw_transaction(), raw);

        assert!(store.delete_raw(&record.hash).unwrap());
        assert!(!store.delete_raw(&record.hash).unwrap());
    }
}
