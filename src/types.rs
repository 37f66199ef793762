//! NewType wrappers for strong typing throughout the server.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing an owning user ID where an advertiser ID is expected).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Identifier of an advertiser account (the tenant).
    ///
    /// This is the `advertisers.id` column. Every active credential resolves
    /// to exactly one of these, either directly or through its owning user.
    TenantId
);

newtype_string!(
    /// Identifier of the user that owns one or more advertiser accounts.
    ///
    /// Legacy-shape credentials carry only this; the tenant is found by
    /// looking up the first advertiser owned by the user.
    UserId
);

newtype_string!(
    /// Short, non-reversible fingerprint of a credential for log output.
    ///
    /// Raw credentials are never logged.
    KeyFingerprint
);

impl KeyFingerprint {
    /// Fingerprint a credential: the first 12 hex characters of its SHA-256.
    pub fn of(credential: &str) -> Self {
        let digest = Sha256::digest(credential.as_bytes());
        let hex = format!("{:x}", digest);
        Self(hex[..12].to_string())
    }
}
