//! # Storage Module
//!
//! Persistence for encrypted transactions.
//!
//! ```text
//! entities.rs — EncryptedTransaction, EncryptedRawTransaction
//! dao.rs      — store traits the transaction core depends on
//! db.rs       — sled implementation of both stores
//! ```
//!
//! The core only ever sees the traits. `SledStore` is what the node binary
//! and the tests plug in. Values are bincode on disk; JSON is for humans.

pub mod dao;
pub mod db;
pub mod entities;

pub use dao::{CommitHookError, EncryptedRawTransactionStore, EncryptedTransactionStore};
pub use db::{DbError, DbResult, SledStore};
pub use entities::{EncryptedRawTransaction, EncryptedTransaction};
