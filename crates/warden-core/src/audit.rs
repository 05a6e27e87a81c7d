use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EventId, Timestamp};

/// An independent hash-chained sequence. Ledger posts, policy decisions,
/// and upgrade lifecycle events each get their own shard and tail, so a
/// burst of writes in one does not contend the others (spec §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainShard {
    Ledger,
    Policy,
    Upgrade,
    General,
}

impl ChainShard {
    pub fn key(self) -> &'static str {
        match self {
            ChainShard::Ledger => "ledger",
            ChainShard::Policy => "policy",
            ChainShard::Upgrade => "upgrade",
            ChainShard::General => "general",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub ts: Timestamp,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub signer_kid: String,
    pub signature: String,
}

/// The fields that get hashed: `SHA-256(canonical({type, payload, prev_hash, ts}))`.
#[derive(Clone, Debug, Serialize)]
pub struct HashedFields<'a> {
    #[serde(rename = "type")]
    pub event_type: &'a str,
    pub payload: &'a Value,
    pub prev_hash: &'a Option<String>,
    pub ts: &'a Timestamp,
}
