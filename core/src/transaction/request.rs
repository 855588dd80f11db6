//! Request and response types for the transaction managers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::payload::{PrivacyGroupId, PrivacyMode, TxHash};

/// Send a new private transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub sender: PublicKey,
    pub recipients: Vec<PublicKey>,
    pub payload: Vec<u8>,
    pub privacy_mode: PrivacyMode,
    pub affected_contract_transactions: Vec<TxHash>,
    pub exec_hash: Vec<u8>,
    pub mandatory_recipients: BTreeSet<PublicKey>,
    pub privacy_group_id: Option<PrivacyGroupId>,
}

impl SendRequest {
    /// Standard private send with no affected transactions.
    pub fn new(sender: PublicKey, recipients: Vec<PublicKey>, payload: Vec<u8>) -> Self {
        Self {
            sender,
            recipients,
            payload,
            ..Default::default()
        }
    }
}

/// Send a transaction previously stored raw, now that it has been signed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSignedRequest {
    /// Hash of the raw transaction, as returned by `store`.
    pub signed_data: Vec<u8>,
    pub recipients: Vec<PublicKey>,
    pub privacy_mode: PrivacyMode,
    pub affected_contract_transactions: Vec<TxHash>,
    pub exec_hash: Vec<u8>,
    pub mandatory_recipients: BTreeSet<PublicKey>,
    pub privacy_group_id: Option<PrivacyGroupId>,
}

/// Fetch and decrypt a stored transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub hash: TxHash,
    /// Key to decrypt with. When absent every managed key is tried.
    pub recipient: Option<PublicKey>,
    /// Look in the raw store instead of the transaction store.
    pub raw: bool,
}

impl ReceiveRequest {
    pub fn new(hash: TxHash) -> Self {
        Self {
            hash,
            recipient: None,
            raw: false,
        }
    }

    pub fn with_recipient(self, recipient: PublicKey) -> Self {
        Self {
            recipient: Some(recipient),
            ..self
        }
    }

    pub fn raw(self) -> Self {
        Self { raw: true, ..self }
    }
}

/// Encrypt a payload for its sender only and keep it for later signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRawRequest {
    pub sender: PublicKey,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub hash: TxHash,
    /// Sender and recipients whose private keys this node holds.
    pub managed_parties: BTreeSet<PublicKey>,
    pub sender: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveResponse {
    pub unencrypted_data: Vec<u8>,
    pub privacy_mode: PrivacyMode,
    pub affected_transactions: BTreeSet<TxHash>,
    pub exec_hash: Vec<u8>,
    pub managed_parties: BTreeSet<PublicKey>,
    pub sender: PublicKey,
    pub privacy_group_id: Option<PrivacyGroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRawResponse {
    pub hash: TxHash,
}
