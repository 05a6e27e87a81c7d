use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub method: String,
    pub path: String,
    pub key: String,
    pub request_hash: String,
    /// `None` while the placeholder is in flight (handler not yet returned).
    pub status: Option<u16>,
    pub body: Option<Vec<u8>>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl IdempotencyRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn is_populated(&self) -> bool {
        self.status.is_some()
    }
}
