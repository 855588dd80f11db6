//! Identifier and byte-string types shared by payloads, the store, and the
//! enclave boundary.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::encoded::PayloadError;

// ---------------------------------------------------------------------------
// Byte newtypes
// ---------------------------------------------------------------------------

macro_rules! byte_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Standard base64 rendering.
            pub fn to_base64(&self) -> String {
                BASE64.encode(&self.0)
            }

            /// Parse a base64 rendering.
            pub fn from_base64(encoded: &str) -> Result<Self, PayloadError> {
                BASE64
                    .decode(encoded.trim())
                    .map(Self)
                    .map_err(|e| PayloadError::Encoding(e.to_string()))
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl From<&[u8]> for $name {
            fn from(bytes: &[u8]) -> Self {
                Self(bytes.to_vec())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_base64())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_base64())
            }
        }
    };
}

byte_newtype!(
    /// Transaction identifier: the payload digest of a cipher text.
    TxHash
);

byte_newtype!(
    /// AES-GCM nonce as carried in a payload.
    Nonce
);

byte_newtype!(
    /// A payload master key sealed for exactly one recipient.
    RecipientBox
);

byte_newtype!(
    /// Binding between a transaction and one of its affected transactions.
    SecurityHash
);

byte_newtype!(
    /// Opaque privacy group identifier, carried through unchanged.
    PrivacyGroupId
);

// ---------------------------------------------------------------------------
// Privacy Mode
// ---------------------------------------------------------------------------

/// How strictly a transaction is tied to the transactions it affects.
///
/// | Mode                     | Flag | Affected-tx checks                           |
/// |--------------------------|------|----------------------------------------------|
/// | `StandardPrivate`        | 0    | none                                         |
/// | `PartyProtection`        | 1    | same mode                                    |
/// | `MandatoryRecipients`    | 2    | same mode, mandatory sets nest               |
/// | `PrivateStateValidation` | 3    | same mode, recipient sets equal, sender in   |
///
/// Everything except `StandardPrivate` needs enhanced privacy switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivacyMode {
    #[default]
    StandardPrivate,
    PartyProtection,
    MandatoryRecipients,
    PrivateStateValidation,
}

impl PrivacyMode {
    /// Numeric flag used on the ledger side.
    pub fn flag(&self) -> u8 {
        match self {
            PrivacyMode::StandardPrivate => 0,
            PrivacyMode::PartyProtection => 1,
            PrivacyMode::MandatoryRecipients => 2,
            PrivacyMode::PrivateStateValidation => 3,
        }
    }

    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(PrivacyMode::StandardPrivate),
            1 => Some(PrivacyMode::PartyProtection),
            2 => Some(PrivacyMode::MandatoryRecipients),
            3 => Some(PrivacyMode::PrivateStateValidation),
            _ => None,
        }
    }

    /// Whether this mode is gated behind the enhanced-privacy switch.
    pub fn requires_enhanced_privacy(&self) -> bool {
        !matches!(self, PrivacyMode::StandardPrivate)
    }

    pub fn is_psv(&self) -> bool {
        matches!(self, PrivacyMode::PrivateStateValidation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyMode::StandardPrivate => "standard-private",
            PrivacyMode::PartyProtection => "party-protection",
            PrivacyMode::MandatoryRecipients => "mandatory-recipients",
            PrivacyMode::PrivateStateValidation => "private-state-validation",
        }
    }
}

impl fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyMode {
    type Err = PayloadError;

    /// Accepts the kebab-case name, the SCREAMING_SNAKE name, `psv`, or the flag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "standard-private" | "standard" => Ok(PrivacyMode::StandardPrivate),
            "party-protection" => Ok(PrivacyMode::PartyProtection),
            "mandatory-recipients" | "mandatory-for" => Ok(PrivacyMode::MandatoryRecipients),
            "private-state-validation" | "psv" => Ok(PrivacyMode::PrivateStateValidation),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(PrivacyMode::from_flag)
                .ok_or_else(|| PayloadError::UnknownPrivacyMode(s.to_string())),
        }
    }
}
