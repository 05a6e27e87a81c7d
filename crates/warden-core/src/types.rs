//! Shared identifier and value types for the Warden domain.
//!
//! Kept deliberately thin: this crate has no I/O and no dependency on the
//! other Warden crates, so every downstream crate can share one vocabulary
//! without circular deps.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// UTC timestamp. All timestamps in the system are this type; wire
/// representations are ISO-8601 via chrono's serde support.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Minor-unit money amount (e.g. cents). Always non-negative on a posted
/// ledger line; the sign of a correction is expressed by swapping `Side`,
/// never by a negative amount.
pub type Amount = i64;

macro_rules! uuid_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({})"), self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(EventId, "EventId");
uuid_id!(PolicyId, "PolicyId");
uuid_id!(UpgradeId, "UpgradeId");
uuid_id!(ProofId, "ProofId");

/// User-supplied journal identifier (e.g. `"jrn-1"`). Unlike the UUID ids
/// above, journals are named by the caller so that retries and corrections
/// can reference them without a round-trip.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JournalId(pub String);

impl fmt::Display for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JournalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JournalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque approver identity (from the configured approver pool).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApproverId(pub String);

impl fmt::Display for ApproverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ApproverId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ApproverId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Double-entry side of a ledger line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Debit,
    Credit,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Debit => write!(f, "debit"),
            Side::Credit => write!(f, "credit"),
        }
    }
}
