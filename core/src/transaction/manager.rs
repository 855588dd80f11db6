//! # Transaction Manager
//!
//! The single entry point for every transaction operation a node performs.
//!
//! ```text
//!   send ─────► dedup recipients ─► affected lookup ─► validate
//!                 ─► enclave encrypt ─► save ──(commit hook)──► publish remote
//!
//!   store_payload ─► validate ─► security hashes ─► own? ─► resend manager
//!                                                  └─► save or merge
//!
//!   receive ─► lookup ─► pick recipient key ─► decrypt ─► managed parties
//! ```
//!
//! Intake (`store_payload`) is serialised by a mutex held by the manager, so
//! concurrent arrivals of the same hash merge one after another. Everything
//! else relies on the store's per-row atomicity.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::{TransactionError, TransactionResult};
use super::merge::merge_recipient;
use super::publish::{BatchPayloadPublisher, PublishError};
use super::request::{
    ReceiveRequest, ReceiveResponse, SendRequest, SendResponse, SendSignedRequest, StoreRawRequest,
    StoreRawResponse,
};
use super::resend::ResendManager;
use crate::crypto::{PayloadDigest, PublicKey};
use crate::enclave::{Enclave, PrivacyMetadata};
use crate::payload::{AffectedTransaction, EncodedPayload, PrivacyMode, TxHash};
use crate::privacy::PrivacyHelper;
use crate::storage::{
    CommitHookError, DbError, EncryptedRawTransaction, EncryptedRawTransactionStore, EncryptedTransaction,
    EncryptedTransactionStore,
};

// ---------------------------------------------------------------------------
// TransactionManager
// ---------------------------------------------------------------------------

/// Coordinates the enclave, the stores, the privacy rules, and publishing.
///
/// Built once per node and shared as `Arc<TransactionManager>`.
pub struct TransactionManager {
    enclave: Arc<dyn Enclave>,
    store: Arc<dyn EncryptedTransactionStore>,
    raw_store: Arc<dyn EncryptedRawTransactionStore>,
    publisher: Arc<dyn BatchPayloadPublisher>,
    resend: Arc<dyn ResendManager>,
    privacy_helper: PrivacyHelper,
    digest: Arc<dyn PayloadDigest>,
    store_lock: Mutex<()>,
}

impl TransactionManager {
    pub fn new(
        enclave: Arc<dyn Enclave>,
        store: Arc<dyn EncryptedTransactionStore>,
        raw_store: Arc<dyn EncryptedRawTransactionStore>,
        publisher: Arc<dyn BatchPayloadPublisher>,
        resend: Arc<dyn ResendManager>,
        privacy_helper: PrivacyHelper,
        digest: Arc<dyn PayloadDigest>,
    ) -> Self {
        Self {
            enclave,
            store,
            raw_store,
            publisher,
            resend,
            privacy_helper,
            digest,
            store_lock: Mutex::new(()),
        }
    }

    // -- Send path ----------------------------------------------------------

    /// Encrypt, persist, and publish a new transaction.
    pub fn send(&self, request: &SendRequest) -> TransactionResult<SendResponse> {
        let sender = request.sender;
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
            &sender,
            &recipients,
            &metadata_for(request, affected),
        )?;
        let hash = TxHash::new(self.digest.digest(&payload.cipher_text));

        self.save_and_publish(&hash, payload, &recipients)?;
        info!(tx_hash = %hash, mode = %request.privacy_mode, recipients = recipients.len(), "sent transaction");

        Ok(SendResponse {
            hash,
            managed_parties: self.managed_among(&recipients),
            sender,
        })
    }

    /// Turn a stored raw transaction into a full one and send it.
    ///
    /// The signed data is the hash the raw transaction was stored under.
    pub fn send_signed_transaction(&self, request: &SendSignedRequest) -> TransactionResult<SendResponse> {
        let hash = TxHash::new(request.signed_data.clone());
        let raw = self
            .raw_store
            .retrieve_raw_by_hash(&hash)?
            .ok_or_else(|| TransactionError::TransactionNotFound(hash.clone()))?;
        let sender = raw.sender;

        let requested: Vec<PublicKey> = request
            .recipients
            .iter()
            .copied()
            .chain(self.enclave.forwarding_keys())
            .chain(std::iter::once(sender))
            .collect();

        let affected = self
            .privacy_helper
            .find_affected_contract_transactions_from_send_request(&request.affected_contract_transactions)?;
        self.privacy_helper.validate_send_request(
            request.privacy_mode,
            &requested,
            &affected,
            &request.mandatory_recipients,
        )?;
        let recipients = dedup_keys(requested);

        let metadata = PrivacyMetadata {
            privacy_mode: request.privacy_mode,
            affected_transactions: affected,
            exec_hash: request.exec_hash.clone(),
            mandatory_recipients: request.mandatory_recipients.clone(),
            privacy_group_id: request.privacy_group_id.clone(),
        };
        let payload = self.enclave.encrypt_raw_transaction_payload(
            &raw.to_raw_transaction(),
            &recipients,
            &metadata,
        )?;

        self.save_and_publish(&hash, payload, &recipients)?;
        info!(tx_hash = %hash, mode = %request.privacy_mode, "sent signed transaction");

        Ok(SendResponse {
            hash,
            managed_parties: self.managed_among(&recipients),
            sender,
        })
    }

    /// Encrypt a payload for its sender alone and keep it until it is signed.
    pub fn store(&self, request: &StoreRawRequest) -> TransactionResult<StoreRawResponse> {
        let raw = self.enclave.encrypt_raw_payload(&request.payload, &request.sender)?;
        let hash = TxHash::new(self.digest.digest(&raw.encrypted_payload));

        self.raw_store
            .save_raw(&EncryptedRawTransaction::new(hash.clone(), raw))?;
        info!(tx_hash = %hash, sender = %request.sender, "stored raw transaction");

        Ok(StoreRawResponse { hash })
    }

    /// Persist a new transaction, publishing to remote recipients only once
    /// the row exists. A failed publish removes the row again.
    fn save_and_publish(
        &self,
        hash: &TxHash,
        payload: EncodedPayload,
        recipients: &[PublicKey],
    ) -> TransactionResult<()> {
        let managed = self.enclave.public_keys();
        let remote: Vec<PublicKey> = recipients
            .iter()
            .filter(|key| !managed.contains(key))
            .copied()
            .collect();

        let tx = EncryptedTransaction::new(hash.clone(), payload);
        let publish = || -> Result<(), CommitHookError> {
            self.publisher.publish_payload(&tx.payload, &remote)?;
            Ok(())
        };

        match self.store.save_with_callback(&tx, &publish) {
            Ok(()) => Ok(()),
            Err(DbError::CommitHook(source)) => match source.downcast::<PublishError>() {
                Ok(publish_error) => Err(TransactionError::Publish(*publish_error)),
                Err(other) => Err(DbError::CommitHook(other).into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    // -- Intake path --------------------------------------------------------

    /// Accept a payload published by another node (or echoed back to us).
    ///
    /// Returns the transaction hash, also when the payload was discarded.
    pub fn store_payload(&self, payload: &EncodedPayload) -> TransactionResult<TxHash> {
        let _guard = self.store_lock.lock();

        let hash = TxHash::new(self.digest.digest(&payload.cipher_text));

        let affected = self
            .privacy_helper
            .find_affected_contract_transactions_from_payload(payload)?;
        if !self.privacy_helper.validate_payload(&hash, payload, &affected)? {
            warn!(tx_hash = %hash, "discarded incoming payload");
            return Ok(hash);
        }

        let invalid = self.enclave.find_invalid_security_hashes(payload, &affected)?;
        let payload = if invalid.is_empty() {
            payload.clone()
        } else {
            self.privacy_helper
                .sanitise_privacy_payload(&hash, payload, &invalid)?
        };

        if payload.recipient_boxes.is_empty() {
            return Err(TransactionError::IntegrityViolation(format!(
                "payload for {hash} carries no recipient box"
            )));
        }

        if self.enclave.public_keys().contains(&payload.sender_key) {
            debug!(tx_hash = %hash, "payload was sent by this node");
            self.resend.accept_own_message(&payload)?;
            return Ok(hash);
        }

        match self.store.retrieve_by_hash(&hash)? {
            None => {
                self.store
                    .save(&EncryptedTransaction::new(hash.clone(), payload))?;
                info!(tx_hash = %hash, "stored incoming transaction");
            }
            Some(existing) => match merge_recipient(&existing.payload, &payload)? {
                None => debug!(tx_hash = %hash, "recipient box already stored"),
                Some(merged) => {
                    self.store.update(&existing.with_payload(merged))?;
                    info!(tx_hash = %hash, "merged recipient into stored transaction");
                }
            },
        }

        Ok(hash)
    }

    // -- Receive path -------------------------------------------------------

    /// Decrypt a stored transaction.
    pub fn receive(&self, request: &ReceiveRequest) -> TransactionResult<ReceiveResponse> {
        if request.raw {
            return self.receive_raw(&request.hash);
        }

        let tx = self.find(&request.hash)?;
        let payload = &tx.payload;

        let recipient = match request.recipient {
            Some(key) => key,
            None => search_for_recipient_key(self.enclave.as_ref(), payload)?
                .ok_or_else(|| TransactionError::RecipientKeyNotFound(tx.hash.to_string()))?,
        };
        let unencrypted_data = self.enclave.unencrypt_transaction(payload, &recipient)?;

        let managed_parties = if payload.is_legacy() {
            self.legacy_managed_parties(payload)?
        } else {
            self.managed_among(&payload.recipient_keys)
        };

        Ok(ReceiveResponse {
            unencrypted_data,
            privacy_mode: payload.privacy_mode,
            affected_transactions: payload.affected_hashes(),
            exec_hash: payload.exec_hash.clone(),
            managed_parties,
            sender: payload.sender_key,
            privacy_group_id: payload.privacy_group_id.clone(),
        })
    }

    fn receive_raw(&self, hash: &TxHash) -> TransactionResult<ReceiveResponse> {
        let raw = self
            .raw_store
            .retrieve_raw_by_hash(hash)?
            .ok_or_else(|| TransactionError::TransactionNotFound(hash.clone()))?;
        let unencrypted_data = self.enclave.unencrypt_raw_payload(&raw.to_raw_transaction())?;

        Ok(ReceiveResponse {
            unencrypted_data,
            privacy_mode: PrivacyMode::StandardPrivate,
            affected_transactions: BTreeSet::new(),
            exec_hash: Vec::new(),
            managed_parties: BTreeSet::from([raw.sender]),
            sender: raw.sender,
            privacy_group_id: None,
        })
    }

    /// Legacy payloads do not say whose box is whose, so each box is tried
    /// on its own.
    fn legacy_managed_parties(&self, payload: &EncodedPayload) -> TransactionResult<BTreeSet<PublicKey>> {
        let mut parties = BTreeSet::new();
        for recipient_box in &payload.recipient_boxes {
            let single = EncodedPayload {
                recipient_boxes: vec![recipient_box.clone()],
                ..payload.clone()
            };
            if let Some(key) = search_for_recipient_key(self.enclave.as_ref(), &single)? {
                parties.insert(key);
            }
        }
        Ok(parties)
    }

    // -- Queries ------------------------------------------------------------

    pub fn delete(&self, hash: &TxHash) -> TransactionResult<()> {
        match self.store.delete(hash) {
            Ok(()) => {
                info!(tx_hash = %hash, "deleted transaction");
                Ok(())
            }
            Err(DbError::NotFound(_)) => Err(TransactionError::TransactionNotFound(hash.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every transaction sent by or addressed to `key`.
    pub fn delete_all(&self, key: &PublicKey) -> TransactionResult<usize> {
        let removed = self.store.delete_all(key)?;
        info!(key = %key, removed, "deleted transactions for key");
        Ok(removed)
    }

    pub fn upcheck(&self) -> bool {
        self.store.upcheck() && self.raw_store.upcheck_raw()
    }

    /// Whether one of our keys sent the transaction.
    pub fn is_sender(&self, hash: &TxHash) -> TransactionResult<bool> {
        let tx = self.find(hash)?;
        Ok(self.enclave.public_keys().contains(&tx.payload.sender_key))
    }

    /// The recipient keys recorded on the stored transaction.
    pub fn get_participants(&self, hash: &TxHash) -> TransactionResult<Vec<PublicKey>> {
        Ok(self.find(hash)?.payload.recipient_keys)
    }

    pub fn get_mandatory_recipients(&self, hash: &TxHash) -> TransactionResult<BTreeSet<PublicKey>> {
        let payload = self.find(hash)?.payload;
        if payload.privacy_mode != PrivacyMode::MandatoryRecipients {
            return Err(TransactionError::MandatoryRecipientsNotAvailable(hash.clone()));
        }
        Ok(payload.mandatory_recipients)
    }

    pub fn default_public_key(&self) -> PublicKey {
        self.enclave.default_public_key()
    }

    fn find(&self, hash: &TxHash) -> TransactionResult<EncryptedTransaction> {
        self.store
            .retrieve_by_hash(hash)?
            .ok_or_else(|| TransactionError::TransactionNotFound(hash.clone()))
    }

    fn managed_among(&self, keys: &[PublicKey]) -> BTreeSet<PublicKey> {
        let managed = self.enclave.public_keys();
        keys.iter().filter(|key| managed.contains(key)).copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Drop repeated keys, keeping the first occurrence of each.
pub(crate) fn dedup_keys(keys: impl IntoIterator<Item = PublicKey>) -> Vec<PublicKey> {
    let mut seen = BTreeSet::new();
    keys.into_iter().filter(|key| seen.insert(*key)).collect()
}

/// Request recipients, then the sender, then forwarding keys, without repeats.
pub(crate) fn send_recipients(request: &SendRequest, enclave: &dyn Enclave) -> Vec<PublicKey> {
    dedup_keys(
        request
            .recipients
            .iter()
            .copied()
            .chain(std::iter::once(request.sender))
            .chain(enclave.forwarding_keys()),
    )
}

/// First managed key that opens `payload`, if any.
///
/// Keys are tried lazily in key order. Only wrong-key failures move on to
/// the next key; any other enclave failure ends the search.
pub(crate) fn search_for_recipient_key(
    enclave: &dyn Enclave,
    payload: &EncodedPayload,
) -> TransactionResult<Option<PublicKey>> {
    for key in enclave.public_keys() {
        match enclave.unencrypt_transaction(payload, &key) {
            Ok(_) => return Ok(Some(key)),
            Err(e) if e.is_wrong_key() => {
                debug!(key = %key, error = %e, "key does not open payload");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// Enclave metadata for a send request whose affected transactions are resolved.
pub(crate) fn metadata_for(request: &SendRequest, affected: Vec<AffectedTransaction>) -> PrivacyMetadata {
    PrivacyMetadata {
        privacy_mode: request.privacy_mode,
        affected_transactions: affected,
        exec_hash: request.exec_hash.clone(),
        mandatory_recipients: request.mandatory_recipients.clone(),
        privacy_group_id: request.privacy_group_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::Sha3Digest;
    use crate::crypto::KeyPair;
    use crate::enclave::{Keyring, LocalEnclave};
    use crate::payload::RecipientBox;
    use crate::storage::SledStore;
    use crate::transaction::resend::OwnMessageResender;

    // -- Helpers ------------------------------------------------------------

    #[derive(Default)]
    struct MemoryPublisher {
        published: Mutex<Vec<(EncodedPayload, Vec<PublicKey>)>>,
        fail: bool,
    }

    impl BatchPayloadPublisher for MemoryPublisher {
        fn publish_payload(&self, payload: &EncodedPayload, recipients: &[PublicKey]) -> Result<(), PublishError> {
            if self.fail {
                if let Some(first) = recipients.first() {
                    return Err(PublishError::NoRoute(*first));
                }
            }
            self.published.lock().push((payload.clone(), recipients.to_vec()));
            Ok(())
        }
    }

    struct Node {
        manager: TransactionManager,
        enclave: Arc<LocalEnclave>,
        store: Arc<SledStore>,
        publisher: Arc<MemoryPublisher>,
    }

    fn node_with(keyring: Keyring, publisher: MemoryPublisher, enhanced: bool) -> Node {
        let enclave = Arc::new(LocalEnclave::new(keyring));
        let store = Arc::new(SledStore::open_temporary().expect("temp store"));
        let publisher = Arc::new(publisher);
        let digest: Arc<dyn PayloadDigest> = Arc::new(Sha3Digest);
        let resend = Arc::new(OwnMessageResender::new(store.clone(), enclave.clone(), digest.clone()));
        let manager = TransactionManager::new(
            enclave.clone(),
            store.clone(),
            store.clone(),
            publisher.clone(),
            resend,
            PrivacyHelper::new(store.clone(), enhanced),
            digest,
        );
        Node {
            manager,
            enclave,
            store,
            publisher,
        }
    }

    fn node() -> Node {
        node_with(Keyring::new(KeyPair::generate()), MemoryPublisher::default(), true)
    }

    fn remote() -> PublicKey {
        KeyPair::generate().public_key()
    }

    // -- Send ---------------------------------------------------------------

    #[test]
    fn send_stores_and_publishes_to_remote_only() {
        let node = node();
        let me = node.manager.default_public_key();
        let (bob, carol) = (remote(), remote());

        let response = node
            .manager
            .send(&SendRequest::new(me, vec![bob, carol, bob], b"hello".to_vec()))
            .unwrap();

        assert_eq!(response.sender, me);
        assert_eq!(response.managed_parties, BTreeSet::from([me]));

        let stored = node.store.retrieve_by_hash(&response.hash).unwrap().unwrap();
        assert_eq!(stored.payload.recipient_keys, vec![bob, carol, me]);
        assert_eq!(stored.payload.recipient_boxes.len(), 3);

        let published = node.publisher.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, vec![bob, carol]);
    }

    #[test]
    fn send_adds_forwarding_keys() {
        let forward = remote();
        let keyring = Keyring::new(KeyPair::generate()).with_forwarding_key(forward);
        let node = node_with(keyring, MemoryPublisher::default(), true);
        let me = node.manager.default_public_key();
        let bob = remote();

        let response = node
            .manager
            .send(&SendRequest::new(me, vec![bob], b"forwarded".to_vec()))
            .unwrap();

        assert_eq!(
            node.manager.get_participants(&response.hash).unwrap(),
            vec![bob, me, forward]
        );
        assert_eq!(node.publisher.published.lock()[0].1, vec![bob, forward]);
    }

    #[test]
    fn failed_publish_rolls_back_the_row() {
        let node = node_with(
            Keyring::new(KeyPair::generate()),
            MemoryPublisher {
                fail: true,
                ..Default::default()
            },
            true,
        );
        let me = node.manager.default_public_key();

        let err = node
            .manager
            .send(&SendRequest::new(me, vec![remote()], b"lost".to_vec()))
            .unwrap_err();
        assert!(matches!(err, TransactionError::Publish(PublishError::NoRoute(_))));
        assert_eq!(node.store.transaction_count(), 0);
    }

    #[test]
    fn enhanced_mode_needs_the_switch() {
        let node = node_with(Keyring::new(KeyPair::generate()), MemoryPublisher::default(), false);
        let me = node.manager.default_public_key();
        let request = SendRequest {
            privacy_mode: PrivacyMode::PartyProtection,
            ..SendRequest::new(me, vec![remote()], b"pp".to_vec())
        };

        assert!(matches!(
            node.manager.send(&request),
            Err(TransactionError::EnhancedPrivacyNotSupported(PrivacyMode::PartyProtection))
        ));
        assert!(node.publisher.published.lock().is_empty());
    }

    #[test]
    fn unknown_affected_transaction_fails_send() {
        let node = node();
        let me = node.manager.default_public_key();
        let request = SendRequest {
            affected_contract_transactions: vec![TxHash::new(vec![9; 64])],
            ..SendRequest::new(me, vec![remote()], b"x".to_vec())
        };
        assert!(matches!(
            node.manager.send(&request),
            Err(TransactionError::PrivacyViolation(_))
        ));
    }

    // -- Raw ----------------------------------------------------------------

    #[test]
    fn raw_store_sign_and_receive() {
        let node = node();
        let me = node.manager.default_public_key();
        let bob = remote();

        let stored = node
            .manager
            .store(&StoreRawRequest {
                sender: me,
                payload: b"raw body".to_vec(),
            })
            .unwrap();

        let raw = node
            .manager
            .receive(&ReceiveRequest::new(stored.hash.clone()).raw())
            .unwrap();
        assert_eq!(raw.unencrypted_data, b"raw body");
        assert_eq!(raw.managed_parties, BTreeSet::from([me]));

        let sent = node
            .manager
            .send_signed_transaction(&SendSignedRequest {
                signed_data: stored.hash.as_bytes().to_vec(),
                recipients: vec![bob, me],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sent.hash, stored.hash);
        assert_eq!(sent.sender, me);
        assert_eq!(node.manager.get_participants(&sent.hash).unwrap(), vec![bob, me]);

        let received = node.manager.receive(&ReceiveRequest::new(sent.hash)).unwrap();
        assert_eq!(received.unencrypted_data, b"raw body");
    }

    #[test]
    fn signing_unknown_raw_transaction_fails() {
        let node = node();
        let err = node
            .manager
            .send_signed_transaction(&SendSignedRequest {
                signed_data: vec![1; 64],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, TransactionError::TransactionNotFound(_)));
    }

    // -- Intake -------------------------------------------------------------

    #[test]
    fn incoming_payload_is_stored_once_and_merged() {
        let alice = node();
        let bob_node = node_with(
            Keyring::new(KeyPair::generate()).with_key(KeyPair::generate()),
            MemoryPublisher::default(),
            true,
        );
        let bob_keys: Vec<PublicKey> = bob_node.enclave.public_keys().into_iter().collect();
        let a = alice.manager.default_public_key();

        let sent = alice
            .manager
            .send(&SendRequest::new(a, bob_keys.clone(), b"two keys".to_vec()))
            .unwrap();
        let full = alice.store.retrieve_by_hash(&sent.hash).unwrap().unwrap().payload;

        for key in &bob_keys {
            let view = full.for_recipient(key).unwrap();
            assert_eq!(bob_node.manager.store_payload(&view).unwrap(), sent.hash);
            // Redelivery is a no-op.
            bob_node.manager.store_payload(&view).unwrap();
        }

        let stored = bob_node.store.retrieve_by_hash(&sent.hash).unwrap().unwrap();
        assert_eq!(stored.payload.recipient_keys.len(), 2);
        assert_eq!(stored.payload.recipient_boxes.len(), 2);
        assert_eq!(bob_node.store.transaction_count(), 1);

        let received = bob_node.manager.receive(&ReceiveRequest::new(sent.hash.clone())).unwrap();
        assert_eq!(received.unencrypted_data, b"two keys");
        assert_eq!(received.sender, a);
        assert_eq!(received.managed_parties, bob_keys.into_iter().collect::<BTreeSet<_>>());
        assert!(!bob_node.manager.is_sender(&sent.hash).unwrap());
    }

    #[test]
    fn incoming_payload_without_box_is_rejected() {
        let node = node();
        let payload = EncodedPayload {
            sender_key: remote(),
            cipher_text: b"cipher".to_vec(),
            recipient_keys: vec![node.manager.default_public_key()],
            ..Default::default()
        };
        assert!(matches!(
            node.manager.store_payload(&payload),
            Err(TransactionError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn legacy_managed_parties_found_by_trial() {
        let alice = node();
        let bob = node();
        let a = alice.manager.default_public_key();
        let b = bob.manager.default_public_key();

        let sent = alice
            .manager
            .send(&SendRequest::new(a, vec![b], b"legacy".to_vec()))
            .unwrap();
        let full = alice.store.retrieve_by_hash(&sent.hash).unwrap().unwrap().payload;
        let legacy = EncodedPayload {
            recipient_keys: Vec::new(),
            ..full.for_recipient(&b).unwrap()
        };

        bob.manager.store_payload(&legacy).unwrap();
        let received = bob.manager.receive(&ReceiveRequest::new(sent.hash)).unwrap();
        assert_eq!(received.unencrypted_data, b"legacy");
        assert_eq!(received.managed_parties, BTreeSet::from([b]));
    }

    // -- Receive ------------------------------------------------------------

    #[test]
    fn sender_reads_its_own_transaction() {
        let node = node();
        let me = node.manager.default_public_key();
        let sent = node
            .manager
            .send(&SendRequest {
                exec_hash: b"exec".to_vec(),
                ..SendRequest::new(me, vec![remote()], b"mine".to_vec())
            })
            .unwrap();

        let received = node.manager.receive(&ReceiveRequest::new(sent.hash.clone())).unwrap();
        assert_eq!(received.unencrypted_data, b"mine");
        assert_eq!(received.sender, me);
        assert_eq!(received.exec_hash, b"exec");
        assert_eq!(received.managed_parties, BTreeSet::from([me]));
        assert_eq!(received.privacy_mode, PrivacyMode::StandardPrivate);
    }

    #[test]
    fn receive_without_matching_key_is_reported() {
        let node = node();
        let other = node_with(Keyring::new(KeyPair::generate()), MemoryPublisher::default(), true);
        let hash = TxHash::new(vec![7; 64]);
        let payload = EncodedPayload {
            sender_key: other.manager.default_public_key(),
            cipher_text: b"opaque".to_vec(),
            recipient_keys: vec![remote()],
            recipient_boxes: vec![RecipientBox::new(vec![0; 48])],
            ..Default::default()
        };
        node.store.save(&EncryptedTransaction::new(hash.clone(), payload)).unwrap();

        assert!(matches!(
            node.manager.receive(&ReceiveRequest::new(hash)),
            Err(TransactionError::RecipientKeyNotFound(_))
        ));
    }

    #[test]
    fn missing_transaction_is_not_found() {
        let node = node();
        let hash = TxHash::new(vec![3; 64]);
        assert!(matches!(
            node.manager.receive(&ReceiveRequest::new(hash.clone())),
            Err(TransactionError::TransactionNotFound(_))
        ));
        assert!(matches!(
            node.manager.delete(&hash),
            Err(TransactionError::TransactionNotFound(_))
        ));
    }

    // -- Queries ------------------------------------------------------------

    #[test]
    fn mandatory_recipients_only_for_that_mode() {
        let node = node();
        let me = node.manager.default_public_key();
        let bob = remote();

        let standard = node
            .manager
            .send(&SendRequest::new(me, vec![bob], b"s".to_vec()))
            .unwrap();
        assert!(matches!(
            node.manager.get_mandatory_recipients(&standard.hash),
            Err(TransactionError::MandatoryRecipientsNotAvailable(_))
        ));

        let mandatory = node
            .manager
            .send(&SendRequest {
                privacy_mode: PrivacyMode::MandatoryRecipients,
                mandatory_recipients: BTreeSet::from([bob]),
                ..SendRequest::new(me, vec![bob], b"m".to_vec())
            })
            .unwrap();
        assert_eq!(
            node.manager.get_mandatory_recipients(&mandatory.hash).unwrap(),
            BTreeSet::from([bob])
        );
        assert!(node.manager.is_sender(&mandatory.hash).unwrap());
    }

    #[test]
    fn delete_and_delete_all() {
        let node = node();
        let me = node.manager.default_public_key();
        let (bob, carol) = (remote(), remote());

        let first = node.manager.send(&SendRequest::new(me, vec![bob], b"1".to_vec())).unwrap();
        node.manager.send(&SendRequest::new(me, vec![bob], b"2".to_vec())).unwrap();
        node.manager.send(&SendRequest::new(me, vec![carol], b"3".to_vec())).unwrap();

        node.manager.delete(&first.hash).unwrap();
        assert_eq!(node.store.transaction_count(), 2);
        assert_eq!(node.manager.delete_all(&bob).unwrap(), 1);
        assert_eq!(node.store.transaction_count(), 1);
        assert!(node.manager.upcheck());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let (a, b, c) = (remote(), remote(), remote());
        assert_eq!(dedup_keys(vec![b, a, b, c, a]), vec![b, a, c]);
    }
}
