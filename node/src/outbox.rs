//! File-based delivery of outgoing payloads.
//!
//! Each stripped payload is written to
//! `<outbox>/<recipient-hex>/<tx-hash-hex>.bin` in bincode. Whatever moves
//! files between nodes picks them up from there; the receiving operator
//! feeds them to `privy-node ingest`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use privy_core::crypto::{PayloadDigest, PublicKey};
use privy_core::payload::EncodedPayload;
use privy_core::transaction::{PayloadPublisher, PublishError};

pub struct OutboxPublisher {
    root: PathBuf,
    digest: Arc<dyn PayloadDigest>,
}

impl OutboxPublisher {
    pub fn new(root: impl Into<PathBuf>, digest: Arc<dyn PayloadDigest>) -> Self {
        Self {
            root: root.into(),
            digest,
        }
    }

    /// Where the payload for `recipient` with cipher text digest `hash` lands.
    pub fn path_for(&self, recipient: &PublicKey, hash: &[u8]) -> PathBuf {
        self.root
            .join(recipient.to_hex())
            .join(format!("{}.bin", hex::encode(hash)))
    }
}

impl PayloadPublisher for OutboxPublisher {
    fn publish_payload(&self, payload: &EncodedPayload, recipient: &PublicKey) -> Result<(), PublishError> {
        let delivery_error = |reason: String| PublishError::Delivery {
            recipient: *recipient,
            reason,
        };

        let hash = self.digest.digest(&payload.cipher_text);
        let path = self.path_for(recipient, &hash);
        let bytes = payload.to_bytes().map_err(|e| delivery_error(e.to_string()))?;

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| delivery_error(format!("cannot create {}: {e}", dir.display())))?;
        }
        std::fs::write(&path, bytes)
            .map_err(|e| delivery_error(format!("cannot write {}: {e}", path.display())))?;

        debug!(recipient = %recipient, path = %path.display(), "payload written to outbox");
        Ok(())
    }
}
