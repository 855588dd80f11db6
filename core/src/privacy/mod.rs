//! # Privacy Rules
//!
//! The policy engine deciding which sends and which incoming payloads are
//! legal under their privacy mode. See [`helper`] for the rule table.

pub mod helper;

pub use helper::PrivacyHelper;
