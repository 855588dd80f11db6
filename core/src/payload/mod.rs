//! # Payload Data Model
//!
//! ```text
//! types.rs    — byte identifiers (TxHash, Nonce, RecipientBox, ...) and PrivacyMode
//! encoded.rs  — EncodedPayload, per-recipient stripping, AffectedTransaction
//! ```

pub mod encoded;
pub mod types;

pub use encoded::{AffectedTransaction, EncodedPayload, PayloadError};
pub use types::{Nonce, PrivacyGroupId, PrivacyMode, RecipientBox, SecurityHash, TxHash};
