use std::path::Path;

use sled::Transactional;
use warden_core::audit::{AuditEvent, ChainShard};
use warden_core::error::WardenError;
use warden_core::idempotency::IdempotencyRecord;
use warden_core::ledger::{Journal, LedgerProof};
use warden_core::policy::{Policy, PolicyHistoryEntry};
use warden_core::signer::SignerRecord;
use warden_core::types::{ApproverId, JournalId, PolicyId, ProofId, UpgradeId};
use warden_core::upgrade::{Approval, Upgrade};

/// Persistent state database backed by sled.
///
/// Named trees:
///   audit_event        — shard byte || seq(u64 be)       → bincode(AuditEvent)
///   audit_tail         — shard byte                       → bincode((u64, String)) [seq, hash]
///   idempotency        — "method\0path\0key"               → bincode(IdempotencyRecord)
///   policy             — PolicyId bytes                   → bincode(Policy)
///   policy_by_name_ver — "name\0version(be)"                → PolicyId bytes
///   policy_history     — PolicyId bytes || seq(u64 be)     → bincode(PolicyHistoryEntry)
///   upgrade            — UpgradeId bytes                   → bincode(Upgrade)
///   upgrade_approval   — UpgradeId bytes || ApproverId      → bincode(Approval)
///   ledger_journal     — JournalId bytes                   → bincode(Journal)
///   ledger_proof       — ProofId bytes                     → bincode(LedgerProof)
///   signer_registry    — kid bytes                         → bincode(SignerRecord)
///   meta               — utf8 key bytes                    → raw bytes
pub struct StateDb {
    _db: sled::Db,
    audit_event: sled::Tree,
    audit_tail: sled::Tree,
    idempotency: sled::Tree,
    policy: sled::Tree,
    policy_by_name_ver: sled::Tree,
    policy_history: sled::Tree,
    upgrade: sled::Tree,
    upgrade_approval: sled::Tree,
    ledger_journal: sled::Tree,
    ledger_proof: sled::Tree,
    signer_registry: sled::Tree,
    meta: sled::Tree,
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WardenError> {
        let db = sled::open(path).map_err(|e| WardenError::Storage(e.to_string()))?;
        let audit_event = open_tree(&db, "audit_event")?;
        let audit_tail = open_tree(&db, "audit_tail")?;
        let idempotency = open_tree(&db, "idempotency")?;
        let policy = open_tree(&db, "policy")?;
        let policy_by_name_ver = open_tree(&db, "policy_by_name_ver")?;
        let policy_history = open_tree(&db, "policy_history")?;
        let upgrade = open_tree(&db, "upgrade")?;
        let upgrade_approval = open_tree(&db, "upgrade_approval")?;
        let ledger_journal = open_tree(&db, "ledger_journal")?;
        let ledger_proof = open_tree(&db, "ledger_proof")?;
        let signer_registry = open_tree(&db, "signer_registry")?;
        let meta = open_tree(&db, "meta")?;
        Ok(Self {
            _db: db,
            audit_event,
            audit_tail,
            idempotency,
            policy,
            policy_by_name_ver,
            policy_history,
            upgrade,
            upgrade_approval,
            ledger_journal,
            ledger_proof,
            signer_registry,
            meta,
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), WardenError> {
        self._db.flush().map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    // ── Audit chain ──────────────────────────────────────────────────────────

    fn audit_event_key(shard: ChainShard, seq: u64) -> Vec<u8> {
        let mut key = shard.key().as_bytes().to_vec();
        key.push(0);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    /// Tail of a shard: the last-appended (seq, hash), or `None` for an empty chain.
    pub fn get_audit_tail(&self, shard: ChainShard) -> Result<Option<(u64, String)>, WardenError> {
        match self
            .audit_tail
            .get(shard.key().as_bytes())
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let tail = bincode::deserialize(&bytes)
                    .map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(tail))
            }
            None => Ok(None),
        }
    }

    /// Append one event to `shard` at `seq`, advancing the tail. The caller
    /// (`warden-audit`) is responsible for serializing concurrent appends to
    /// the same shard — this is a plain write, not a compare-and-swap.
    pub fn put_audit_event(&self, shard: ChainShard, seq: u64, event: &AuditEvent) -> Result<(), WardenError> {
        let bytes = bincode::serialize(event).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.audit_event
            .insert(Self::audit_event_key(shard, seq), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        let tail = bincode::serialize(&(seq, event.hash.clone()))
            .map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.audit_tail
            .insert(shard.key().as_bytes(), tail)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_audit_event(&self, shard: ChainShard, seq: u64) -> Result<Option<AuditEvent>, WardenError> {
        match self
            .audit_event
            .get(Self::audit_event_key(shard, seq))
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let event = bincode::deserialize(&bytes)
                    .map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    /// Every event in `shard` with `seq` in `[from, to]`, in ascending order.
    pub fn iter_audit_range(
        &self,
        shard: ChainShard,
        from: u64,
        to: u64,
    ) -> Result<Vec<AuditEvent>, WardenError> {
        let lo = Self::audit_event_key(shard, from);
        let hi = Self::audit_event_key(shard, to);
        let mut out = Vec::new();
        for item in self.audit_event.range(lo..=hi) {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    // ── Idempotency ──────────────────────────────────────────────────────────

    fn idempotency_key(method: &str, path: &str, key: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(method.len() + path.len() + key.len() + 2);
        k.extend_from_slice(method.as_bytes());
        k.push(0);
        k.extend_from_slice(path.as_bytes());
        k.push(0);
        k.extend_from_slice(key.as_bytes());
        k
    }

    pub fn get_idempotency(
        &self,
        method: &str,
        path: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, WardenError> {
        match self
            .idempotency
            .get(Self::idempotency_key(method, path, key))
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let rec = bincode::deserialize(&bytes)
                    .map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(rec))
            }
            None => Ok(None),
        }
    }

    pub fn put_idempotency(&self, record: &IdempotencyRecord) -> Result<(), WardenError> {
        let bytes = bincode::serialize(record).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.idempotency
            .insert(Self::idempotency_key(&record.method, &record.path, &record.key), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Atomically insert the record only if no record exists yet for this
    /// key, returning the winner either way. Used for the Fresh/Replay race
    /// at the start of `IdempotencyStore::begin` (spec §4.3).
    pub fn cas_idempotency(&self, record: &IdempotencyRecord) -> Result<IdempotencyRecord, WardenError> {
        let key = Self::idempotency_key(&record.method, &record.path, &record.key);
        let bytes = bincode::serialize(record).map_err(|e| WardenError::Serialization(e.to_string()))?;
        match self
            .idempotency
            .compare_and_swap(key.clone(), None::<&[u8]>, Some(bytes))
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Ok(()) => Ok(record.clone()),
            Err(cas_err) => {
                let existing = cas_err
                    .current
                    .ok_or_else(|| WardenError::Internal("idempotency CAS race with no winner".to_string()))?;
                bincode::deserialize(&existing).map_err(|e| WardenError::Serialization(e.to_string()))
            }
        }
    }

    pub fn iter_expired_idempotency(&self, now_unix: i64) -> Result<Vec<IdempotencyRecord>, WardenError> {
        let mut out = Vec::new();
        for item in self.idempotency.iter() {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            let rec: IdempotencyRecord =
                bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
            if rec.expires_at.timestamp() <= now_unix {
                out.push(rec);
            }
        }
        Ok(out)
    }

    pub fn remove_idempotency(&self, method: &str, path: &str, key: &str) -> Result<(), WardenError> {
        self.idempotency
            .remove(Self::idempotency_key(method, path, key))
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    // ── Policy ───────────────────────────────────────────────────────────────

    pub fn get_policy(&self, id: &PolicyId) -> Result<Option<Policy>, WardenError> {
        match self
            .policy
            .get(id.0.as_bytes())
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let p = bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    pub fn put_policy(&self, policy: &Policy) -> Result<(), WardenError> {
        let bytes = bincode::serialize(policy).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.policy
            .insert(policy.id.0.as_bytes(), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        let idx_key = Self::name_version_key(&policy.name, policy.version);
        self.policy_by_name_ver
            .insert(idx_key, policy.id.0.as_bytes().to_vec())
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    fn name_version_key(name: &str, version: u32) -> Vec<u8> {
        let mut k = name.as_bytes().to_vec();
        k.push(0);
        k.extend_from_slice(&version.to_be_bytes());
        k
    }

    pub fn get_policy_by_name_version(&self, name: &str, version: u32) -> Result<Option<Policy>, WardenError> {
        match self
            .policy_by_name_ver
            .get(Self::name_version_key(name, version))
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(id_bytes) => {
                let id = PolicyId::from_uuid(
                    uuid::Uuid::from_slice(&id_bytes).map_err(|e| WardenError::Serialization(e.to_string()))?,
                );
                self.get_policy(&id)
            }
            None => Ok(None),
        }
    }

    /// Latest version on record for `name`, if any exist.
    pub fn latest_policy_version(&self, name: &str) -> Result<Option<u32>, WardenError> {
        let prefix = {
            let mut p = name.as_bytes().to_vec();
            p.push(0);
            p
        };
        let mut latest: Option<u32> = None;
        for item in self.policy_by_name_ver.scan_prefix(&prefix) {
            let (key, _) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            let version_bytes = &key[prefix.len()..];
            if version_bytes.len() == 4 {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(version_bytes);
                let v = u32::from_be_bytes(arr);
                latest = Some(latest.map_or(v, |cur| cur.max(v)));
            }
        }
        Ok(latest)
    }

    pub fn iter_policies(&self) -> Result<Vec<Policy>, WardenError> {
        let mut out = Vec::new();
        for item in self.policy.iter() {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    /// All active policies, for the sentinel evaluation cache to hydrate.
    pub fn iter_active_policies(&self) -> Result<Vec<Policy>, WardenError> {
        Ok(self
            .iter_policies()?
            .into_iter()
            .filter(|p| matches!(p.state, warden_core::policy::PolicyState::Active | warden_core::policy::PolicyState::Canary))
            .collect())
    }

    pub fn append_policy_history(&self, entry: &PolicyHistoryEntry) -> Result<(), WardenError> {
        let seq = self.next_policy_history_seq(&entry.policy_id)?;
        let mut key = entry.policy_id.0.as_bytes().to_vec();
        key.extend_from_slice(&seq.to_be_bytes());
        let bytes = bincode::serialize(entry).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.policy_history
            .insert(key, bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    fn next_policy_history_seq(&self, policy_id: &PolicyId) -> Result<u64, WardenError> {
        let meta_key = format!("policy_history_seq:{}", policy_id.0);
        let current = self
            .get_meta(&meta_key)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(0);
        self.put_meta(&meta_key, &(current + 1).to_be_bytes())?;
        Ok(current)
    }

    pub fn iter_policy_history(&self, policy_id: &PolicyId) -> Result<Vec<PolicyHistoryEntry>, WardenError> {
        let mut out = Vec::new();
        for item in self.policy_history.scan_prefix(policy_id.0.as_bytes()) {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    // ── Upgrade ──────────────────────────────────────────────────────────────

    pub fn get_upgrade(&self, id: &UpgradeId) -> Result<Option<Upgrade>, WardenError> {
        match self
            .upgrade
            .get(id.0.as_bytes())
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let u = bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(u))
            }
            None => Ok(None),
        }
    }

    pub fn put_upgrade(&self, upgrade: &Upgrade) -> Result<(), WardenError> {
        let bytes = bincode::serialize(upgrade).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.upgrade
            .insert(upgrade.id.0.as_bytes(), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn iter_upgrades(&self) -> Result<Vec<Upgrade>, WardenError> {
        let mut out = Vec::new();
        for item in self.upgrade.iter() {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    /// Every upgrade currently `emergency_applied`, used by the ratification
    /// sweep to find deadlines that have passed.
    pub fn iter_emergency_applied_upgrades(&self) -> Result<Vec<Upgrade>, WardenError> {
        Ok(self
            .iter_upgrades()?
            .into_iter()
            .filter(|u| matches!(u.state, warden_core::upgrade::UpgradeState::EmergencyApplied))
            .collect())
    }

    fn approval_key(upgrade_id: &UpgradeId, approver_id: &ApproverId) -> Vec<u8> {
        let mut k = upgrade_id.0.as_bytes().to_vec();
        k.push(0);
        k.extend_from_slice(approver_id.0.as_bytes());
        k
    }

    pub fn put_approval(&self, approval: &Approval) -> Result<(), WardenError> {
        let bytes = bincode::serialize(approval).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.upgrade_approval
            .insert(Self::approval_key(&approval.upgrade_id, &approval.approver_id), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_approval(
        &self,
        upgrade_id: &UpgradeId,
        approver_id: &ApproverId,
    ) -> Result<Option<Approval>, WardenError> {
        match self
            .upgrade_approval
            .get(Self::approval_key(upgrade_id, approver_id))
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let a = bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(a))
            }
            None => Ok(None),
        }
    }

    pub fn iter_approvals(&self, upgrade_id: &UpgradeId) -> Result<Vec<Approval>, WardenError> {
        let mut out = Vec::new();
        for item in self.upgrade_approval.scan_prefix(upgrade_id.0.as_bytes()) {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    // ── Ledger ───────────────────────────────────────────────────────────────

    pub fn get_journal(&self, id: &JournalId) -> Result<Option<Journal>, WardenError> {
        match self
            .ledger_journal
            .get(id.0.as_bytes())
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let j = bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(j))
            }
            None => Ok(None),
        }
    }

    pub fn journal_exists(&self, id: &JournalId) -> bool {
        self.ledger_journal.contains_key(id.0.as_bytes()).unwrap_or(false)
    }

    pub fn put_journal(&self, journal: &Journal) -> Result<(), WardenError> {
        let bytes = bincode::serialize(journal).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.ledger_journal
            .insert(journal.journal_id.0.as_bytes(), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Insert `journal` and its already-hashed-and-signed `event` (at
    /// `seq` in `shard`, advancing the shard's tail) inside one sled
    /// multi-tree transaction, so a crash or error between the two halves
    /// leaves neither row durable rather than a posted journal with no
    /// audit row (spec §4.2/§4.5/§5: "journal insert and its audit event
    /// in the same transaction"). The caller is expected to hold the
    /// shard's writer lock (via `AuditChain::prepare_append`) across this
    /// call.
    pub fn commit_journal_with_audit(
        &self,
        journal: &Journal,
        shard: ChainShard,
        seq: u64,
        event: &AuditEvent,
    ) -> Result<(), WardenError> {
        let journal_key = journal.journal_id.0.as_bytes().to_vec();
        let journal_bytes =
            bincode::serialize(journal).map_err(|e| WardenError::Serialization(e.to_string()))?;
        let event_key = Self::audit_event_key(shard, seq);
        let event_bytes =
            bincode::serialize(event).map_err(|e| WardenError::Serialization(e.to_string()))?;
        let tail_key = shard.key().as_bytes().to_vec();
        let tail_bytes = bincode::serialize(&(seq, event.hash.clone()))
            .map_err(|e| WardenError::Serialization(e.to_string()))?;

        let result: sled::transaction::TransactionResult<(), ()> =
            (&self.ledger_journal, &self.audit_event, &self.audit_tail).transaction(
                |(journals, events, tails)| {
                    journals.insert(journal_key.clone(), journal_bytes.clone())?;
                    events.insert(event_key.clone(), event_bytes.clone())?;
                    tails.insert(tail_key.clone(), tail_bytes.clone())?;
                    Ok(())
                },
            );
        result.map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Every journal with `posted_at` in the half-open instant range
    /// `[from_ts, to_ts)`, ordered by `(posted_at, journal_id)` for
    /// deterministic proof generation (spec §4.5). Compares full
    /// sub-second `DateTime<Utc>` values, not truncated seconds, so a
    /// journal posted anywhere inside the range is never bucketed out by
    /// rounding.
    pub fn iter_journals_in_range(
        &self,
        from_ts: warden_core::types::Timestamp,
        to_ts: warden_core::types::Timestamp,
    ) -> Result<Vec<Journal>, WardenError> {
        let mut out = Vec::new();
        for item in self.ledger_journal.iter() {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            let j: Journal = bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
            if j.posted_at >= from_ts && j.posted_at < to_ts {
                out.push(j);
            }
        }
        out.sort_by(|a, b| a.posted_at.cmp(&b.posted_at).then_with(|| a.journal_id.0.cmp(&b.journal_id.0)));
        Ok(out)
    }

    pub fn put_proof(&self, proof: &LedgerProof) -> Result<(), WardenError> {
        let bytes = bincode::serialize(proof).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.ledger_proof
            .insert(proof.proof_id.0.as_bytes(), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_proof(&self, id: &ProofId) -> Result<Option<LedgerProof>, WardenError> {
        match self
            .ledger_proof
            .get(id.0.as_bytes())
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let p = bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    // ── Signer registry ──────────────────────────────────────────────────────

    pub fn get_signer(&self, kid: &str) -> Result<Option<SignerRecord>, WardenError> {
        match self
            .signer_registry
            .get(kid.as_bytes())
            .map_err(|e| WardenError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let r = bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    pub fn put_signer(&self, record: &SignerRecord) -> Result<(), WardenError> {
        let bytes = bincode::serialize(record).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.signer_registry
            .insert(record.kid.as_bytes(), bytes)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn iter_signers(&self) -> Result<Vec<SignerRecord>, WardenError> {
        let mut out = Vec::new();
        for item in self.signer_registry.iter() {
            let (_, bytes) = item.map_err(|e| WardenError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| WardenError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), WardenError> {
        self.meta
            .insert(key.as_bytes(), value)
            .map_err(|e| WardenError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, WardenError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(|e| WardenError::Storage(e.to_string()))
    }
}

fn open_tree(db: &sled::Db, name: &str) -> Result<sled::Tree, WardenError> {
    db.open_tree(name).map_err(|e| WardenError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::types::Timestamp;

    fn temp_db() -> StateDb {
        let dir = tempfile::tempdir().unwrap();
        StateDb::open(dir.path()).unwrap()
    }

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    #[test]
    fn audit_tail_advances_on_append() {
        let db = temp_db();
        assert!(db.get_audit_tail(ChainShard::Ledger).unwrap().is_none());

        let event = AuditEvent {
            id: warden_core::types::EventId::new(),
            event_type: "test".to_string(),
            payload: serde_json::json!({}),
            ts: now(),
            prev_hash: None,
            hash: "abc123".to_string(),
            signer_kid: "local-ed25519:deadbeef".to_string(),
            signature: "sig".to_string(),
        };
        db.put_audit_event(ChainShard::Ledger, 0, &event).unwrap();

        let tail = db.get_audit_tail(ChainShard::Ledger).unwrap().unwrap();
        assert_eq!(tail, (0, "abc123".to_string()));
        assert!(db.get_audit_tail(ChainShard::Policy).unwrap().is_none());
    }

    #[test]
    fn commit_journal_with_audit_lands_both_rows_together() {
        use warden_core::ledger::LedgerLine;
        use warden_core::types::Side;

        let db = temp_db();
        let journal = Journal {
            journal_id: JournalId::from("jrn-atomic"),
            entries: vec![
                LedgerLine { account_id: "cash".into(), side: Side::Debit, amount: 100, currency: "USD".into(), meta: None },
                LedgerLine { account_id: "revenue".into(), side: Side::Credit, amount: 100, currency: "USD".into(), meta: None },
            ],
            context: None,
            fx: None,
            compensates: None,
            posted_at: now(),
        };
        let event = AuditEvent {
            id: warden_core::types::EventId::new(),
            event_type: "ledger.post".to_string(),
            payload: serde_json::json!({"journal_id": "jrn-atomic"}),
            ts: now(),
            prev_hash: None,
            hash: "deadbeef".to_string(),
            signer_kid: "local-ed25519:deadbeef".to_string(),
            signature: "sig".to_string(),
        };

        db.commit_journal_with_audit(&journal, ChainShard::Ledger, 0, &event).unwrap();

        assert!(db.journal_exists(&JournalId::from("jrn-atomic")));
        let stored_event = db.get_audit_event(ChainShard::Ledger, 0).unwrap().unwrap();
        assert_eq!(stored_event.hash, "deadbeef");
        let tail = db.get_audit_tail(ChainShard::Ledger).unwrap().unwrap();
        assert_eq!(tail, (0, "deadbeef".to_string()));
    }

    #[test]
    fn idempotency_cas_picks_one_winner() {
        let db = temp_db();
        let rec_a = IdempotencyRecord {
            method: "POST".to_string(),
            path: "/ledger/journals".to_string(),
            key: "idem-1".to_string(),
            request_hash: "hash-a".to_string(),
            status: None,
            body: None,
            created_at: now(),
            expires_at: now(),
        };
        let mut rec_b = rec_a.clone();
        rec_b.request_hash = "hash-b".to_string();

        let winner_a = db.cas_idempotency(&rec_a).unwrap();
        let winner_b = db.cas_idempotency(&rec_b).unwrap();
        assert_eq!(winner_a.request_hash, winner_b.request_hash);
        assert_eq!(winner_a.request_hash, "hash-a");
    }

    #[test]
    fn policy_lookup_by_name_version() {
        let db = temp_db();
        let policy = Policy {
            id: PolicyId::new(),
            name: "kyc.deny-sanctioned".to_string(),
            version: 1,
            severity: warden_core::policy::Severity::Low,
            rule: serde_json::json!({}),
            metadata: warden_core::policy::PolicyMetadata::default(),
            state: warden_core::policy::PolicyState::Draft,
            creator: "alice".to_string(),
            created_at: now(),
            updated_at: now(),
        };
        db.put_policy(&policy).unwrap();

        let found = db.get_policy_by_name_version("kyc.deny-sanctioned", 1).unwrap().unwrap();
        assert_eq!(found.id, policy.id);
        assert_eq!(db.latest_policy_version("kyc.deny-sanctioned").unwrap(), Some(1));
        assert!(db.get_policy_by_name_version("kyc.deny-sanctioned", 2).unwrap().is_none());
    }
}
