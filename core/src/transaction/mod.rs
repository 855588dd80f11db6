//! # Transaction Module
//!
//! Sending, receiving, and reconciling private transactions.
//!
//! ## Architecture
//!
//! ```text
//! request.rs         — request/response values crossing the core boundary
//! manager.rs         — TransactionManager: send, intake, receive, queries
//! merge.rs           — folding a second recipient box into a stored payload
//! resend.rs          — rebuilding our own transactions from peer echoes
//! payload_manager.rs — create/decrypt payloads without persistence
//! publish.rs         — publisher traits and the fan-out publisher
//! error.rs           — TransactionError
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Send** — [`TransactionManager::send`] encrypts for every recipient,
//!    stores the full payload, then publishes one stripped copy per remote
//!    recipient.
//! 2. **Intake** — each recipient node calls
//!    [`TransactionManager::store_payload`], which validates, sanitises, and
//!    saves or merges.
//! 3. **Receive** — [`TransactionManager::receive`] decrypts with the
//!    recipient key (found by trial when not given).
//!
//! ## Design Decisions
//!
//! - A transaction's hash is the digest of its cipher text, so every node
//!   derives the same key for the same transaction without coordination.
//! - Publishing happens inside the store's commit hook: a transaction that
//!   was never persisted is never published.
//! - Payload values are never mutated in place. Merges and sanitising build
//!   new values with struct update syntax.

pub mod error;
pub mod manager;
pub mod merge;
pub mod payload_manager;
pub mod publish;
pub mod request;
pub mod resend;

pub use error::{TransactionError, TransactionResult};
pub use manager::TransactionManager;
pub use payload_manager::EncodedPayloadManager;
pub use publish::{BatchPayloadPublisher, FanOutPublisher, PayloadPublisher, PublishError};
pub use request::{
    ReceiveRequest, ReceiveResponse, SendRequest, SendResponse, SendSignedRequest, StoreRawRequest,
    StoreRawResponse,
};
pub use resend::{OwnMessageResender, ResendManager};
