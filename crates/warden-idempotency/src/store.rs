use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use warden_core::canonical;
use warden_core::constants::{IDEMPOTENCY_DEFAULT_BODY_LIMIT_BYTES, IDEMPOTENCY_DEFAULT_EXPIRY_HOURS};
use warden_core::error::WardenError;
use warden_core::hash::sha256_hex;
use warden_core::idempotency::IdempotencyRecord;
use warden_store::StateDb;

/// `request_hash = SHA-256(method | path | stable_serialize(body))` (spec §4.3).
pub fn request_hash(method: &str, path: &str, body: &Value) -> Result<String, WardenError> {
    let canonical_body =
        canonical::canonicalize(body).map_err(|e| WardenError::Serialization(e.to_string()))?;
    let mut buf = Vec::with_capacity(method.len() + path.len() + canonical_body.len() + 2);
    buf.extend_from_slice(method.as_bytes());
    buf.push(b'|');
    buf.extend_from_slice(path.as_bytes());
    buf.push(b'|');
    buf.extend_from_slice(&canonical_body);
    Ok(sha256_hex(&buf))
}

/// Outcome of `IdempotencyStore::begin` (spec §4.3 protocol).
pub enum Outcome {
    /// A prior request with the same key and body already completed;
    /// replay its response verbatim, no handler execution.
    Replay { status: u16, body: Vec<u8> },
    /// Same key, different body — or a request for the same key is still
    /// in flight. The caller must not run the handler.
    Conflict,
    /// No prior request recorded; a placeholder row has been inserted and
    /// the caller should run the handler, then call `Guard::commit`.
    Fresh(Guard),
}

/// Holds the placeholder row inserted by `begin` until the handler finishes.
pub struct Guard {
    store: Arc<StateDb>,
    method: String,
    path: String,
    key: String,
    body_limit: usize,
}

impl Guard {
    /// Populate the placeholder with the handler's result. Deletes the
    /// placeholder and fails with `PayloadTooLarge` if `body` exceeds the
    /// configured limit, so a future retry sees no stale row (spec §9: an
    /// oversize response must not be "sticky").
    pub fn commit(self, status: u16, body: Vec<u8>) -> Result<(), WardenError> {
        if body.len() > self.body_limit {
            self.store.remove_idempotency(&self.method, &self.path, &self.key)?;
            return Err(WardenError::PayloadTooLarge { limit: self.body_limit });
        }
        let mut record = self
            .store
            .get_idempotency(&self.method, &self.path, &self.key)?
            .ok_or_else(|| WardenError::Internal("idempotency placeholder vanished before commit".to_string()))?;
        record.status = Some(status);
        record.body = Some(body);
        self.store.put_idempotency(&record)
    }

    /// Discard the placeholder, e.g. because the handler itself failed and
    /// the failure should not be memoized as the key's canonical response.
    pub fn rollback(self) -> Result<(), WardenError> {
        self.store.remove_idempotency(&self.method, &self.path, &self.key)
    }
}

/// Configuration for the idempotency layer; read from environment in
/// `warden-node` (`IDEMPOTENCY_RESPONSE_BODY_LIMIT`).
#[derive(Clone, Copy, Debug)]
pub struct IdempotencyConfig {
    pub expiry_hours: i64,
    pub body_limit_bytes: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            expiry_hours: IDEMPOTENCY_DEFAULT_EXPIRY_HOURS,
            body_limit_bytes: IDEMPOTENCY_DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

pub struct IdempotencyStore {
    store: Arc<StateDb>,
    config: IdempotencyConfig,
}

impl IdempotencyStore {
    pub fn new(store: Arc<StateDb>, config: IdempotencyConfig) -> Self {
        Self { store, config }
    }

    /// Implements the begin-transaction protocol from spec §4.3. `body` is
    /// the already-parsed request body used for hashing, not bytes off the wire.
    pub fn begin(&self, method: &str, path: &str, key: &str, body: &Value) -> Result<Outcome, WardenError> {
        let hash = request_hash(method, path, body)?;
        let now = Utc::now();

        if let Some(existing) = self.store.get_idempotency(method, path, key)? {
            if existing.is_expired(now) {
                self.store.remove_idempotency(method, path, key)?;
            } else if existing.request_hash != hash {
                return Ok(Outcome::Conflict);
            } else if existing.is_populated() {
                return Ok(Outcome::Replay {
                    status: existing.status.expect("is_populated guarantees status"),
                    body: existing.body.clone().unwrap_or_default(),
                });
            } else {
                // Placeholder for the same (key, hash) still in flight.
                return Ok(Outcome::Conflict);
            }
        }

        let placeholder = IdempotencyRecord {
            method: method.to_string(),
            path: path.to_string(),
            key: key.to_string(),
            request_hash: hash.clone(),
            status: None,
            body: None,
            created_at: now,
            expires_at: now + Duration::hours(self.config.expiry_hours),
        };

        let winner = self.store.cas_idempotency(&placeholder)?;
        if winner.request_hash != hash {
            return Ok(Outcome::Conflict);
        }
        if winner.is_populated() {
            return Ok(Outcome::Replay {
                status: winner.status.expect("is_populated guarantees status"),
                body: winner.body.unwrap_or_default(),
            });
        }

        Ok(Outcome::Fresh(Guard {
            store: self.store.clone(),
            method: method.to_string(),
            path: path.to_string(),
            key: key.to_string(),
            body_limit: self.config.body_limit_bytes,
        }))
    }

    /// Delete every row past its `expires_at`. Run periodically from
    /// `warden-node`'s background sweep task.
    pub fn evict_expired(&self) -> Result<usize, WardenError> {
        let now = Utc::now().timestamp();
        let expired = self.store.iter_expired_idempotency(now)?;
        let count = expired.len();
        for rec in expired {
            self.store.remove_idempotency(&rec.method, &rec.path, &rec.key)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> Arc<StateDb> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(StateDb::open(dir.path()).unwrap())
    }

    #[test]
    fn fresh_then_replay() {
        let idem = IdempotencyStore::new(temp_store(), IdempotencyConfig::default());
        let body = serde_json::json!({"amount": 100});

        let guard = match idem.begin("POST", "/ledger/journals", "key-1", &body).unwrap() {
            Outcome::Fresh(g) => g,
            _ => panic!("expected Fresh on first call"),
        };
        guard.commit(201, b"{\"ok\":true}".to_vec()).unwrap();

        match idem.begin("POST", "/ledger/journals", "key-1", &body).unwrap() {
            Outcome::Replay { status, body } => {
                assert_eq!(status, 201);
                assert_eq!(body, b"{\"ok\":true}");
            }
            _ => panic!("expected Replay on second call"),
        }
    }

    #[test]
    fn conflicting_body_is_rejected() {
        let idem = IdempotencyStore::new(temp_store(), IdempotencyConfig::default());
        let body_a = serde_json::json!({"amount": 100});
        let body_b = serde_json::json!({"amount": 200});

        let guard = match idem.begin("POST", "/ledger/journals", "key-1", &body_a).unwrap() {
            Outcome::Fresh(g) => g,
            _ => panic!("expected Fresh"),
        };
        guard.commit(201, b"{}".to_vec()).unwrap();

        assert!(matches!(
            idem.begin("POST", "/ledger/journals", "key-1", &body_b).unwrap(),
            Outcome::Conflict
        ));
    }

    #[test]
    fn oversize_commit_clears_placeholder() {
        let config = IdempotencyConfig { expiry_hours: 24, body_limit_bytes: 4 };
        let idem = IdempotencyStore::new(temp_store(), config);
        let body = serde_json::json!({});

        let guard = match idem.begin("POST", "/x", "key-1", &body).unwrap() {
            Outcome::Fresh(g) => g,
            _ => panic!("expected Fresh"),
        };
        let err = guard.commit(200, b"too-long-body".to_vec()).unwrap_err();
        assert!(matches!(err, WardenError::PayloadTooLarge { .. }));

        // placeholder was deleted, so a retry sees a clean slate
        assert!(matches!(
            idem.begin("POST", "/x", "key-1", &body).unwrap(),
            Outcome::Fresh(_)
        ));
    }
}
