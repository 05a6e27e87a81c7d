use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use warden_core::audit::{AuditEvent, ChainShard, HashedFields};
use warden_core::canonical;
use warden_core::error::WardenError;
use warden_core::hash::sha256_hex;
use warden_core::types::EventId;
use warden_crypto::SigningService;
use warden_store::StateDb;

use crate::error::AuditError;

/// The append-only, hash-chained audit log (spec §4.2). One independent
/// sequence per `ChainShard`; a per-shard `tokio::sync::Mutex` serializes
/// writers so the append reads the tail, computes the next hash, and signs
/// it without a concurrent writer racing the tail forward underneath it.
pub struct AuditChain {
    store: Arc<StateDb>,
    signer: Arc<SigningService>,
    locks: HashMap<ChainShard, Mutex<()>>,
}

impl AuditChain {
    pub fn new(store: Arc<StateDb>, signer: Arc<SigningService>) -> Self {
        let mut locks = HashMap::new();
        for shard in [
            ChainShard::Ledger,
            ChainShard::Policy,
            ChainShard::Upgrade,
            ChainShard::General,
        ] {
            locks.insert(shard, Mutex::new(()));
        }
        Self { store, signer, locks }
    }

    /// Append one event to `shard`. Implements the protocol in spec §4.2:
    /// lock the tail, canonicalize, hash, sign, insert, advance the tail.
    /// Used by callers (policy decisions, upgrade lifecycle events) whose
    /// only durable side effect is the audit row itself — for callers that
    /// also need to persist a domain row atomically with the event (the
    /// ledger), use `prepare_append` instead and commit both together.
    pub async fn append(
        &self,
        shard: ChainShard,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEvent, AuditError> {
        let prepared = self.prepare_append(shard, event_type, payload).await?;
        self.store.put_audit_event(shard, prepared.seq, &prepared.event)?;
        Ok(prepared.event)
    }

    /// Lock `shard`'s tail, canonicalize, hash, and sign the next event,
    /// but do NOT write it — the caller commits it (and whatever domain
    /// row must land atomically with it) in its own storage transaction.
    /// The returned `PreparedAppend` holds the shard's writer lock for as
    /// long as it lives, so the tail cannot advance underneath the caller
    /// between signing and commit (spec §4.2/§5 single-writer discipline).
    pub async fn prepare_append(
        &self,
        shard: ChainShard,
        event_type: &str,
        payload: Value,
    ) -> Result<PreparedAppend<'_>, AuditError> {
        let guard = self
            .locks
            .get(&shard)
            .expect("all shards have a lock registered")
            .lock()
            .await;

        let tail = self.store.get_audit_tail(shard)?;
        let (next_seq, prev_hash) = match tail {
            Some((seq, hash)) => (seq + 1, Some(hash)),
            None => (0, None),
        };

        let ts = Utc::now();
        let hashed = HashedFields {
            event_type,
            payload: &payload,
            prev_hash: &prev_hash,
            ts: &ts,
        };
        let canonical_bytes = canonical::canonicalize(&hashed)?;
        let hash = sha256_hex(&canonical_bytes);

        let signed = self.signer.sign(hash.as_bytes()).await.map_err(AuditError::Signing)?;

        let event = AuditEvent {
            id: EventId::new(),
            event_type: event_type.to_string(),
            payload,
            ts,
            prev_hash,
            hash,
            signer_kid: signed.signer_kid,
            signature: signed.signature_b64,
        };

        Ok(PreparedAppend { _guard: guard, seq: next_seq, event })
    }

    /// Replay `[from, to]` in `shard`, recomputing hashes and checking
    /// `prev_hash` linkage and signature against the registered signer.
    /// Returns the id of the first event that fails verification.
    pub fn verify_range(
        &self,
        registry: &warden_crypto::SignerRegistry,
        shard: ChainShard,
        from: u64,
        to: u64,
    ) -> Result<(), WardenError> {
        let events = self.store.iter_audit_range(shard, from, to)?;
        let mut expected_prev_hash: Option<String> = if from > 0 {
            self.store
                .get_audit_event(shard, from - 1)?
                .map(|e| e.hash)
        } else {
            None
        };

        for event in events {
            if event.prev_hash != expected_prev_hash {
                return Err(WardenError::ChainBroken { at: event.id.to_string() });
            }

            let hashed = HashedFields {
                event_type: &event.event_type,
                payload: &event.payload,
                prev_hash: &event.prev_hash,
                ts: &event.ts,
            };
            let canonical_bytes = canonical::canonicalize(&hashed)
                .map_err(|e| WardenError::Serialization(e.to_string()))?;
            let recomputed = sha256_hex(&canonical_bytes);
            if recomputed != event.hash {
                return Err(WardenError::ChainBroken { at: event.id.to_string() });
            }

            use base64::Engine;
            let sig_bytes = base64::engine::general_purpose::STANDARD
                .decode(&event.signature)
                .map_err(|_| WardenError::ChainBroken { at: event.id.to_string() })?;
            if registry
                .verify(&event.signer_kid, event.hash.as_bytes(), &sig_bytes)
                .is_err()
            {
                return Err(WardenError::ChainBroken { at: event.id.to_string() });
            }

            expected_prev_hash = Some(event.hash);
        }

        Ok(())
    }

    pub fn tail(&self, shard: ChainShard) -> Result<Option<(u64, String)>, WardenError> {
        self.store.get_audit_tail(shard)
    }
}

/// A hashed-and-signed event not yet written to storage, paired with the
/// shard's writer lock. The caller must commit `seq`/`event` into the same
/// storage transaction as any domain row it needs to land atomically with,
/// then drop this value to release the lock.
pub struct PreparedAppend<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
    pub seq: u64,
    pub event: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> Arc<StateDb> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(StateDb::open(dir.path()).unwrap())
    }

    fn local_signer() -> Arc<SigningService> {
        Arc::new(SigningService::local([7u8; 32], false).unwrap())
    }

    #[tokio::test]
    async fn append_chains_hashes_across_events() {
        let store = temp_store();
        let signer = local_signer();
        let chain = AuditChain::new(store, signer);

        let first = chain
            .append(ChainShard::Ledger, "ledger.post", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        assert!(first.prev_hash.is_none());

        let second = chain
            .append(ChainShard::Ledger, "ledger.post", serde_json::json!({"n": 2}))
            .await
            .unwrap();
        assert_eq!(second.prev_hash, Some(first.hash.clone()));

        let (seq, hash) = chain.tail(ChainShard::Ledger).unwrap().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(hash, second.hash);
    }

    #[tokio::test]
    async fn shards_are_independent_chains() {
        let store = temp_store();
        let signer = local_signer();
        let chain = AuditChain::new(store, signer);

        chain
            .append(ChainShard::Ledger, "ledger.post", serde_json::json!({}))
            .await
            .unwrap();
        assert!(chain.tail(ChainShard::Policy).unwrap().is_none());
    }

    #[tokio::test]
    async fn verify_range_detects_tampering() {
        let store = temp_store();
        let signer = local_signer();
        let registry = Arc::new(warden_crypto::SignerRegistry::new());
        signer.register_self(&registry);
        let chain = AuditChain::new(store.clone(), signer);

        chain
            .append(ChainShard::General, "test.event", serde_json::json!({"a": 1}))
            .await
            .unwrap();
        chain
            .append(ChainShard::General, "test.event", serde_json::json!({"a": 2}))
            .await
            .unwrap();

        assert!(chain.verify_range(&registry, ChainShard::General, 0, 1).is_ok());

        let mut tampered = store.get_audit_event(ChainShard::General, 1).unwrap().unwrap();
        tampered.payload = serde_json::json!({"a": 999});
        store.put_audit_event(ChainShard::General, 1, &tampered).unwrap();

        let err = chain.verify_range(&registry, ChainShard::General, 0, 1).unwrap_err();
        assert!(matches!(err, WardenError::ChainBroken { .. }));
    }
}
