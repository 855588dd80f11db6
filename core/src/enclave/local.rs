//! In-process enclave backed by an in-memory X25519 keyring.
//!
//! ## Payload construction
//!
//! ```text
//!   master key      32 random bytes per payload
//!   cipher text     AES-256-GCM(master, cipher_text_nonce, message)
//!   box for R       AES-256-GCM(box_key(S, R), recipient_nonce, master)
//!   box_key(S, R)   BLAKE3-derive-key(X25519(S, R), S, R)
//! ```
//!
//! Opening a box needs one private key from the (sender, recipient) pair.
//! When we sent the payload that is the sender key; otherwise it is the
//! recipient key the caller supplies.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::{Enclave, EnclaveError, EnclaveStatus, PrivacyMetadata, RawTransaction};
use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::{derive_box_key, random_master_key, random_nonce};
use crate::crypto::{open, seal, security_hash, KeyPair, PublicKey};
use crate::payload::{AffectedTransaction, EncodedPayload, Nonce, RecipientBox, SecurityHash, TxHash};

// ---------------------------------------------------------------------------
// Keyring
// ---------------------------------------------------------------------------

/// The key material a node holds: its keypairs, which one is the default
/// sender, and the keys every outgoing transaction is forwarded to.
#[derive(Debug, Clone)]
pub struct Keyring {
    keys: BTreeMap<PublicKey, KeyPair>,
    default_key: PublicKey,
    forwarding: BTreeSet<PublicKey>,
}

impl Keyring {
    pub fn new(default: KeyPair) -> Self {
        let default_key = default.public_key();
        let mut keys = BTreeMap::new();
        keys.insert(default_key, default);
        Self {
            keys,
            default_key,
            forwarding: BTreeSet::new(),
        }
    }

    /// Add another managed keypair.
    pub fn with_key(mut self, pair: KeyPair) -> Self {
        self.keys.insert(pair.public_key(), pair);
        self
    }

    /// Add a key that receives a copy of every outgoing transaction.
    pub fn with_forwarding_key(mut self, key: PublicKey) -> Self {
        self.forwarding.insert(key);
        self
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get(&self, key: &PublicKey) -> Result<&KeyPair, EnclaveError> {
        self.keys.get(key).ok_or(EnclaveError::KeyNotFound(*key))
    }

    pub fn public_keys(&self) -> BTreeSet<PublicKey> {
        self.keys.keys().copied().collect()
    }

    pub fn default_public_key(&self) -> PublicKey {
        self.default_key
    }

    pub fn forwarding_keys(&self) -> BTreeSet<PublicKey> {
        self.forwarding.clone()
    }
}

// ---------------------------------------------------------------------------
// LocalEnclave
// ---------------------------------------------------------------------------

/// [`Enclave`] implementation that keeps private keys in process memory.
#[derive(Debug)]
pub struct LocalEnclave {
    keyring: Keyring,
    running: AtomicBool,
}

impl LocalEnclave {
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring,
            running: AtomicBool::new(true),
        }
    }

    /// Stop serving requests. Every operation afterwards fails with
    /// [`EnclaveError::Stopped`] and `status()` reports `Stopped`.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    fn ensure_running(&self) -> Result<(), EnclaveError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EnclaveError::Stopped)
        }
    }

    fn seal_box(
        &self,
        own: &KeyPair,
        peer: &PublicKey,
        nonce: &Nonce,
        master_key: &[u8],
    ) -> Result<RecipientBox, EnclaveError> {
        let shared = own.diffie_hellman(peer);
        let box_key = derive_box_key(&shared, own.public_key().as_bytes(), peer.as_bytes());
        Ok(RecipientBox::new(seal(&box_key, nonce.as_bytes(), master_key)?))
    }

    fn open_box(
        &self,
        own: &KeyPair,
        peer: &PublicKey,
        nonce: &Nonce,
        recipient_box: &[u8],
    ) -> Result<Vec<u8>, EnclaveError> {
        let shared = own.diffie_hellman(peer);
        let box_key = derive_box_key(&shared, own.public_key().as_bytes(), peer.as_bytes());
        let master_key = open(&box_key, nonce.as_bytes(), recipient_box)
            .map_err(|_| EnclaveError::DecryptionFailed)?;
        if master_key.len() != AES_KEY_LENGTH {
            return Err(EnclaveError::DecryptionFailed);
        }
        Ok(master_key)
    }

    fn seal_boxes(
        &self,
        sender: &PublicKey,
        recipients: &[PublicKey],
        nonce: &Nonce,
        master_key: &[u8],
    ) -> Result<Vec<RecipientBox>, EnclaveError> {
        let sender_pair = self.keyring.get(sender)?;
        recipients
            .iter()
            .map(|recipient| self.seal_box(sender_pair, recipient, nonce, master_key))
            .collect()
    }

    /// Recover a payload's master key through `provided_key`.
    ///
    /// For our own payloads the sender key opens the box aligned with
    /// `provided_key`, or box 0 (paired with key 0) when there is none.
    /// For other nodes' payloads `provided_key` must be ours and opens its
    /// aligned box, or box 0 when the payload does not list it.
    fn open_master_key(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Vec<u8>, EnclaveError> {
        let (own, peer, recipient_box) = if self.keyring.contains(&payload.sender_key) {
            match payload.box_for(provided_key) {
                Some(aligned) => (payload.sender_key, *provided_key, aligned),
                None => {
                    let first_key = payload
                        .recipient_keys
                        .first()
                        .ok_or(EnclaveError::MissingRecipientKey)?;
                    let first_box = payload
                        .recipient_boxes
                        .first()
                        .ok_or(EnclaveError::MissingRecipientBox)?;
                    (payload.sender_key, *first_key, first_box)
                }
            }
        } else {
            let recipient_box = payload
                .box_for(provided_key)
                .or_else(|| payload.recipient_boxes.first())
                .ok_or(EnclaveError::MissingRecipientBox)?;
            (*provided_key, payload.sender_key, recipient_box)
        };

        let own_pair = self.keyring.get(&own)?;
        self.open_box(own_pair, &peer, &payload.recipient_nonce, recipient_box.as_bytes())
    }

    /// Recover a stored payload's master key with whichever managed key opens it.
    fn recover_master_key(&self, payload: &EncodedPayload) -> Result<Vec<u8>, EnclaveError> {
        if self.keyring.contains(&payload.sender_key) {
            return self.open_master_key(payload, &payload.sender_key);
        }

        let mut last_error = EnclaveError::DecryptionFailed;
        for key in self.keyring.public_keys() {
            match self.open_master_key(payload, &key) {
                Ok(master_key) => return Ok(master_key),
                Err(e) if e.is_wrong_key() => {
                    debug!(key = %key, "managed key does not open affected transaction");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    fn security_hashes(
        &self,
        cipher_text: &[u8],
        affected: &[AffectedTransaction],
    ) -> Result<BTreeMap<TxHash, SecurityHash>, EnclaveError> {
        affected
            .iter()
            .map(|tx| {
                let master_key = self.recover_master_key(&tx.payload)?;
                let hash = security_hash(cipher_text, &tx.payload.cipher_text, &master_key);
                Ok((tx.hash.clone(), SecurityHash::new(hash.to_vec())))
            })
            .collect()
    }
}

impl Enclave for LocalEnclave {
    fn default_public_key(&self) -> PublicKey {
        self.keyring.default_public_key()
    }

    fn forwarding_keys(&self) -> BTreeSet<PublicKey> {
        self.keyring.forwarding_keys()
    }

    fn public_keys(&self) -> BTreeSet<PublicKey> {
        self.keyring.public_keys()
    }

    fn encrypt_payload(
        &self,
        message: &[u8],
        sender: &PublicKey,
        recipients: &[PublicKey],
        metadata: &PrivacyMetadata,
    ) -> Result<EncodedPayload, EnclaveError> {
        self.ensure_running()?;

        let master_key = random_master_key();
        let cipher_text_nonce = Nonce::new(random_nonce().to_vec());
        let recipient_nonce = Nonce::new(random_nonce().to_vec());

        let cipher_text = seal(&master_key, cipher_text_nonce.as_bytes(), message)?;
        let recipient_boxes = self.seal_boxes(sender, recipients, &recipient_nonce, &master_key)?;
        let affected_contract_transactions =
            self.security_hashes(&cipher_text, &metadata.affected_transactions)?;

        Ok(EncodedPayload {
            sender_key: *sender,
            cipher_text,
            cipher_text_nonce,
            recipient_boxes,
            recipient_nonce,
            recipient_keys: recipients.to_vec(),
            privacy_mode: metadata.privacy_mode,
            affected_contract_transactions,
            exec_hash: metadata.exec_hash.clone(),
            mandatory_recipients: metadata.mandatory_recipients.clone(),
            privacy_group_id: metadata.privacy_group_id.clone(),
        })
    }

    fn encrypt_raw_transaction_payload(
        &self,
        raw: &RawTransaction,
        recipients: &[PublicKey],
        metadata: &PrivacyMetadata,
    ) -> Result<EncodedPayload, EnclaveError> {
        self.ensure_running()?;

        let sender_pair = self.keyring.get(&raw.from)?;
        let master_key = self.open_box(sender_pair, &raw.from, &raw.nonce, &raw.encrypted_key)?;

        let recipient_nonce = Nonce::new(random_nonce().to_vec());
        let recipient_boxes = self.seal_boxes(&raw.from, recipients, &recipient_nonce, &master_key)?;
        let affected_contract_transactions =
            self.security_hashes(&raw.encrypted_payload, &metadata.affected_transactions)?;

        Ok(EncodedPayload {
            sender_key: raw.from,
            cipher_text: raw.encrypted_payload.clone(),
            cipher_text_nonce: raw.nonce.clone(),
            recipient_boxes,
            recipient_nonce,
            recipient_keys: recipients.to_vec(),
            privacy_mode: metadata.privacy_mode,
            affected_contract_transactions,
            exec_hash: metadata.exec_hash.clone(),
            mandatory_recipients: metadata.mandatory_recipients.clone(),
            privacy_group_id: metadata.privacy_group_id.clone(),
        })
    }

    fn encrypt_raw_payload(
        &self,
        message: &[u8],
        sender: &PublicKey,
    ) -> Result<RawTransaction, EnclaveError> {
        self.ensure_running()?;

        let sender_pair = self.keyring.get(sender)?;
        let master_key = random_master_key();
        let nonce = Nonce::new(random_nonce().to_vec());

        let encrypted_payload = seal(&master_key, nonce.as_bytes(), message)?;
        let encrypted_key = self.seal_box(sender_pair, sender, &nonce, &master_key)?;

        Ok(RawTransaction {
            encrypted_payload,
            encrypted_key: encrypted_key.into_bytes(),
            nonce,
            from: *sender,
        })
    }

    fn unencrypt_transaction(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Vec<u8>, EnclaveError> {
        self.ensure_running()?;

        let master_key = self.open_master_key(payload, provided_key)?;
        Ok(open(
            &master_key,
            payload.cipher_text_nonce.as_bytes(),
            &payload.cipher_text,
        )?)
    }

    fn unencrypt_raw_payload(&self, raw: &RawTransaction) -> Result<Vec<u8>, EnclaveError> {
        self.ensure_running()?;

        let sender_pair = self.keyring.get(&raw.from)?;
        let master_key = self.open_box(sender_pair, &raw.from, &raw.nonce, &raw.encrypted_key)?;
        Ok(open(&master_key, raw.nonce.as_bytes(), &raw.encrypted_payload)?)
    }

    fn create_new_recipient_box(
        &self,
        payload: &EncodedPayload,
        recipient: &PublicKey,
    ) -> Result<RecipientBox, EnclaveError> {
        self.ensure_running()?;

        if payload.recipient_keys.is_empty() || payload.recipient_boxes.is_empty() {
            return Err(EnclaveError::MissingRecipientBox);
        }

        let sender_pair = self.keyring.get(&payload.sender_key)?;
        let master_key = self.open_master_key(payload, &payload.sender_key)?;
        self.seal_box(sender_pair, recipient, &payload.recipient_nonce, &master_key)
    }

    fn find_invalid_security_hashes(
        &self,
        payload: &EncodedPayload,
        affected: &[AffectedTransaction],
    ) -> Result<BTreeSet<TxHash>, EnclaveError> {
        self.ensure_running()?;

        let mut invalid = BTreeSet::new();
        for (hash, declared) in &payload.affected_contract_transactions {
            let Some(affected_tx) = affected.iter().find(|tx| &tx.hash == hash) else {
                debug!(affected = %hash, "affected transaction unknown, security hash unverifiable");
                invalid.insert(hash.clone());
                continue;
            };

            let master_key = self.recover_master_key(&affected_tx.payload)?;
            let expected = security_hash(
                &payload.cipher_text,
                &affected_tx.payload.cipher_text,
                &master_key,
            );
            if declared.as_bytes() != expected.as_slice() {
                warn!(affected = %hash, "security hash mismatch");
                invalid.insert(hash.clone());
            }
        }
        Ok(invalid)
    }

    fn status(&self) -> EnclaveStatus {
        if self.running.load(Ordering::SeqCst) {
            EnclaveStatus::Started
        } else {
            EnclaveStatus::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PrivacyMode;

    // -- Helpers ------------------------------------------------------------

    fn enclave() -> LocalEnclave {
        LocalEnclave::new(Keyring::new(KeyPair::generate()))
    }

    fn affected(hash_byte: u8, payload: EncodedPayload) -> AffectedTransaction {
        AffectedTransaction {
            hash: TxHash::new(vec![hash_byte; 64]),
            payload,
        }
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn sender_and_recipient_both_decrypt() {
        let alice = enclave();
        let bob = enclave();
        let a = alice.default_public_key();
        let b = bob.default_public_key();

        let payload = alice
            .encrypt_payload(b"hello", &a, &[b, a], &PrivacyMetadata::default())
            .unwrap();
        assert_eq!(payload.recipient_keys, vec![b, a]);
        assert_eq!(payload.recipient_boxes.len(), 2);

        assert_eq!(alice.unencrypt_transaction(&payload, &a).unwrap(), b"hello");
        let for_bob = payload.for_recipient(&b).unwrap();
        assert_eq!(bob.unencrypt_transaction(&for_bob, &b).unwrap(), b"hello");
    }

    #[test]
    fn stranger_cannot_decrypt() {
        let alice = enclave();
        let bob = enclave();
        let carol = enclave();
        let a = alice.default_public_key();
        let b = bob.default_public_key();

        let payload = alice
            .encrypt_payload(b"secret", &a, &[b], &PrivacyMetadata::default())
            .unwrap();

        let err = carol
            .unencrypt_transaction(&payload, &carol.default_public_key())
            .unwrap_err();
        assert!(err.is_wrong_key());

        let err = carol.unencrypt_transaction(&payload, &b).unwrap_err();
        assert!(matches!(err, EnclaveError::KeyNotFound(_)));
    }

    #[test]
    fn raw_payload_round_trip_and_promotion() {
        let alice = enclave();
        let bob = enclave();
        let a = alice.default_public_key();
        let b = bob.default_public_key();

        let raw = alice.encrypt_raw_payload(b"raw data", &a).unwrap();
        assert_eq!(alice.unencrypt_raw_payload(&raw).unwrap(), b"raw data");

        let payload = alice
            .encrypt_raw_transaction_payload(&raw, &[b, a], &PrivacyMetadata::default())
            .unwrap();
        assert_eq!(payload.cipher_text, raw.encrypted_payload);
        let for_bob = payload.for_recipient(&b).unwrap();
        assert_eq!(bob.unencrypt_transaction(&for_bob, &b).unwrap(), b"raw data");
    }

    #[test]
    fn new_recipient_box_opens_for_new_recipient() {
        let alice = enclave();
        let bob = enclave();
        let carol = enclave();
        let a = alice.default_public_key();
        let b = bob.default_public_key();
        let c = carol.default_public_key();

        let payload = alice
            .encrypt_payload(b"late joiner", &a, &[b], &PrivacyMetadata::default())
            .unwrap();
        let new_box = alice.create_new_recipient_box(&payload, &c).unwrap();

        let for_carol = EncodedPayload {
            recipient_keys: vec![c],
            recipient_boxes: vec![new_box],
            ..payload.clone()
        };
        assert_eq!(carol.unencrypt_transaction(&for_carol, &c).unwrap(), b"late joiner");

        assert!(bob.create_new_recipient_box(&payload, &c).is_err());
    }

    #[test]
    fn security_hashes_verify_for_recipients() {
        let alice = enclave();
        let bob = enclave();
        let a = alice.default_public_key();
        let b = bob.default_public_key();
        let metadata = PrivacyMetadata {
            privacy_mode: PrivacyMode::PartyProtection,
            ..Default::default()
        };

        let earlier = alice.encrypt_payload(b"earlier", &a, &[b, a], &metadata).unwrap();
        let earlier_for_bob = earlier.for_recipient(&b).unwrap();

        let metadata = PrivacyMetadata {
            affected_transactions: vec![affected(1, earlier.clone())],
            ..metadata
        };
        let later = alice.encrypt_payload(b"later", &a, &[b, a], &metadata).unwrap();
        assert_eq!(later.affected_contract_transactions.len(), 1);

        let invalid = bob
            .find_invalid_security_hashes(
                &later.for_recipient(&b).unwrap(),
                &[affected(1, earlier_for_bob.clone())],
            )
            .unwrap();
        assert!(invalid.is_empty());

        // Unknown affected transaction counts as invalid.
        let invalid = bob.find_invalid_security_hashes(&later, &[]).unwrap();
        assert_eq!(invalid.len(), 1);

        // A tampered security hash is flagged.
        let mut tampered = later.for_recipient(&b).unwrap();
        for value in tampered.affected_contract_transactions.values_mut() {
            *value = SecurityHash::new(vec![0u8; 64]);
        }
        let invalid = bob
            .find_invalid_security_hashes(&tampered, &[affected(1, earlier_for_bob)])
            .unwrap();
        assert!(invalid.contains(&TxHash::new(vec![1u8; 64])));
    }

    #[test]
    fn stopped_enclave_refuses_work() {
        let alice = enclave();
        let a = alice.default_public_key();
        assert_eq!(alice.status(), EnclaveStatus::Started);

        alice.stop();
        assert_eq!(alice.status(), EnclaveStatus::Stopped);
        let err = alice.encrypt_raw_payload(b"x", &a).unwrap_err();
        assert!(matches!(err, EnclaveError::Stopped));
        assert!(!err.is_wrong_key());
    }

    #[test]
    fn keyring_tracks_managed_and_forwarding_keys() {
        let default = KeyPair::generate();
        let extra = KeyPair::generate();
        let forward = KeyPair::generate().public_key();
        let keyring = Keyring::new(default.clone())
            .with_key(extra.clone())
            .with_forwarding_key(forward);

        assert_eq!(keyring.default_public_key(), default.public_key());
        assert!(keyring.contains(&extra.public_key()));
        assert!(!keyring.contains(&forward));
        assert_eq!(keyring.public_keys().len(), 2);
        assert!(keyring.forwarding_keys().contains(&forward));
    }
}
