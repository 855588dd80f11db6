//! Outbound delivery of payloads to remote recipients.
//!
//! The core only decides *what* goes to *whom*. Transport lives behind
//! [`PayloadPublisher`]: the node binary writes to an outbox directory,
//! tests deliver straight into another node's manager.
//!
//! ```text
//!   send ──► BatchPayloadPublisher::publish_payload(payload, [R1, R2, R3])
//!                │
//!                └─ FanOutPublisher: for each Ri in parallel
//!                     payload.for_recipient(Ri) ──► PayloadPublisher
//! ```

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::PublicKey;
use crate::payload::{EncodedPayload, PayloadError};

/// Errors that can occur while publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot prepare payload for {recipient}: {source}")]
    Prepare {
        recipient: PublicKey,
        #[source]
        source: PayloadError,
    },

    #[error("no route to recipient {0}")]
    NoRoute(PublicKey),

    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: PublicKey, reason: String },
}

/// Delivers one already-stripped payload to one recipient.
pub trait PayloadPublisher: Send + Sync {
    fn publish_payload(&self, payload: &EncodedPayload, recipient: &PublicKey) -> Result<(), PublishError>;
}

/// Delivers a full payload to many recipients.
pub trait BatchPayloadPublisher: Send + Sync {
    fn publish_payload(&self, payload: &EncodedPayload, recipients: &[PublicKey]) -> Result<(), PublishError>;
}

/// Strips the payload for each recipient and hands every stripped copy to a
/// single-recipient publisher, in parallel.
///
/// Publishing stops at the first failure reported by rayon; deliveries that
/// already happened are not undone.
#[derive(Debug)]
pub struct FanOutPublisher<P> {
    publisher: P,
}

impl<P: PayloadPublisher> FanOutPublisher<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    pub fn inner(&self) -> &P {
        &self.publisher
    }
}

impl<P: PayloadPublisher> BatchPayloadPublisher for FanOutPublisher<P> {
    fn publish_payload(&self, payload: &EncodedPayload, recipients: &[PublicKey]) -> Result<(), PublishError> {
        if recipients.is_empty() {
            return Ok(());
        }
        debug!(recipients = recipients.len(), "publishing payload");

        recipients.par_iter().try_for_each(|recipient| {
            let outgoing = payload
                .for_recipient(recipient)
                .map_err(|source| PublishError::Prepare {
                    recipient: *recipient,
                    source,
                })?;
            self.publisher
                .publish_payload(&outgoing, recipient)
                .map_err(|e| {
                    warn!(recipient = %recipient, error = %e, "publish failed");
                    e
                })
        })
    }
}
