//! Opaque, server-assigned identifiers.
//!
//! The store decides the representation (UUID text locally, whatever the
//! hosted service issues remotely); the crate only compares and forwards them.

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Form inputs send `""` for "none selected".
            pub fn non_blank(raw: Option<Self>) -> Option<Self> {
                raw.filter(|id| !id.0.trim().is_empty())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<&$name> for serde_json::Value {
            fn from(id: &$name) -> Self {
                serde_json::Value::String(id.0.clone())
            }
        }
    };
}

opaque_id!(DoctorId);
opaque_id!(PatientId);
opaque_id!(VisitId);
opaque_id!(
    /// Identity of an authenticated staff member (also the profile key).
    UserId
);
