use std::sync::Arc;

use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use warden_audit::AuditChain;
use warden_core::audit::ChainShard;
use warden_core::canonical;
use warden_core::constants::APPROVAL_TTL_DAYS;
use warden_core::error::WardenError;
use warden_core::hash::sha256_hex;
use warden_core::policy::PolicyState;
use warden_core::types::{ApproverId, PolicyId, Timestamp, UpgradeId};
use warden_core::upgrade::{
    AppliedUpgradeBundle, Approval, Upgrade, UpgradeManifest, UpgradeState, UpgradeTarget, UpgradeType,
};
use warden_crypto::{SignerRegistry, SigningService};
use warden_sentinel::PolicyEngine;
use warden_store::StateDb;

use crate::pool::ApproverPool;

/// Roles permitted to invoke break-glass apply (spec §4.4.3 "Break-glass").
pub const EMERGENCY_ROLES: &[&str] = &["SuperAdmin", "SecurityEngineer"];

/// The N-of-M multi-sig Upgrade workflow (spec §4.4.3). Owns upgrade
/// manifests and their approvals; delegates the policy-activation side
/// effect back to `warden-sentinel::PolicyEngine` so the upgrade gate and
/// the policy state machine stay in one place each.
pub struct UpgradeWorkflow {
    store: Arc<StateDb>,
    audit: Arc<AuditChain>,
    registry: Arc<SignerRegistry>,
    signer: Arc<SigningService>,
    policy_engine: Arc<PolicyEngine>,
    pool: ApproverPool,
}

impl UpgradeWorkflow {
    pub fn new(
        store: Arc<StateDb>,
        audit: Arc<AuditChain>,
        registry: Arc<SignerRegistry>,
        signer: Arc<SigningService>,
        policy_engine: Arc<PolicyEngine>,
        pool: ApproverPool,
    ) -> Self {
        Self {
            store,
            audit,
            registry,
            signer,
            policy_engine,
            pool,
        }
    }

    pub async fn create_upgrade(
        &self,
        upgrade_type: UpgradeType,
        target: UpgradeTarget,
        rationale: String,
        impact: String,
        preconditions: Vec<String>,
        proposed_by: String,
    ) -> Result<Upgrade, WardenError> {
        let upgrade_id = UpgradeId::new();
        let now = Utc::now();
        let manifest = UpgradeManifest {
            upgrade_id,
            upgrade_type,
            target: target.clone(),
            rationale: rationale.clone(),
            impact: impact.clone(),
            preconditions: preconditions.clone(),
            proposed_by: proposed_by.clone(),
            timestamp: now,
        };
        let manifest_hash = sha256_hex(
            &canonical::canonicalize(&manifest).map_err(|e| WardenError::Serialization(e.to_string()))?,
        );

        let upgrade = Upgrade {
            id: upgrade_id,
            upgrade_type,
            target,
            rationale,
            impact,
            preconditions,
            proposed_by,
            state: UpgradeState::PendingApproval,
            created_at: now,
            updated_at: now,
            emergency: false,
            emergency_ratify_by: None,
            manifest_hash,
        };

        self.store.put_upgrade(&upgrade)?;
        self.audit
            .append(
                ChainShard::Upgrade,
                "upgrade.created",
                json!({
                    "upgrade_id": upgrade.id,
                    "type": upgrade.upgrade_type,
                    "target": upgrade.target,
                    "manifest_hash": upgrade.manifest_hash,
                    "proposed_by": upgrade.proposed_by,
                }),
            )
            .await
            .map_err(WardenError::from)?;

        info!(upgrade_id = %upgrade.id, "upgrade manifest created");
        Ok(upgrade)
    }

    pub fn get_upgrade(&self, id: &UpgradeId) -> Result<Upgrade, WardenError> {
        self.store
            .get_upgrade(id)?
            .ok_or_else(|| WardenError::UpgradeNotFound(id.to_string()))
    }

    fn manifest_of(&self, upgrade: &Upgrade) -> UpgradeManifest {
        UpgradeManifest {
            upgrade_id: upgrade.id,
            upgrade_type: upgrade.upgrade_type,
            target: upgrade.target.clone(),
            rationale: upgrade.rationale.clone(),
            impact: upgrade.impact.clone(),
            preconditions: upgrade.preconditions.clone(),
            proposed_by: upgrade.proposed_by.clone(),
            timestamp: upgrade.created_at,
        }
    }

    /// `POST /upgrade/{id}/approve` (spec §4.4.3 step 2).
    pub async fn submit_approval(
        &self,
        upgrade_id: &UpgradeId,
        approver_id: ApproverId,
        signature_b64: String,
        notes: Option<String>,
    ) -> Result<Upgrade, WardenError> {
        let mut upgrade = self.get_upgrade(upgrade_id)?;
        if matches!(
            upgrade.state,
            UpgradeState::Applied | UpgradeState::Rejected | UpgradeState::EmergencyApplied
        ) {
            return Err(WardenError::InvalidUpgradeTransition {
                from: upgrade.state.to_string(),
                to: "approved".to_string(),
            });
        }

        if !self.pool.contains(&approver_id) {
            return Err(WardenError::ApproverNotInPool(approver_id.to_string()));
        }
        if self.store.get_approval(upgrade_id, &approver_id)?.is_some() {
            return Err(WardenError::DuplicateApproval(approver_id.to_string()));
        }

        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(&signature_b64)
            .map_err(|_| WardenError::SignatureInvalid)?;
        self.registry
            .verify(approver_id.0.as_str(), upgrade.manifest_hash.as_bytes(), &sig_bytes)
            .map_err(|_| WardenError::SignatureInvalid)?;

        let now = Utc::now();
        let approval = Approval {
            upgrade_id: *upgrade_id,
            approver_id: approver_id.clone(),
            signature: signature_b64,
            notes,
            ts: now,
        };
        self.store.put_approval(&approval)?;
        self.audit
            .append(
                ChainShard::Upgrade,
                "approval.submitted",
                json!({"upgrade_id": upgrade_id, "approver_id": approver_id}),
            )
            .await
            .map_err(WardenError::from)?;

        let valid = self.count_valid_approvals(&upgrade, now)?;
        if valid >= self.pool.required() && upgrade.state == UpgradeState::PendingApproval {
            upgrade.state = UpgradeState::QuorumReached;
            upgrade.updated_at = now;
            self.store.put_upgrade(&upgrade)?;
            self.audit
                .append(
                    ChainShard::Upgrade,
                    "upgrade.quorum_reached",
                    json!({"upgrade_id": upgrade_id, "valid_approvals": valid}),
                )
                .await
                .map_err(WardenError::from)?;
            info!(upgrade_id = %upgrade.id, valid, "upgrade reached quorum");
        }

        Ok(upgrade)
    }

    fn count_valid_approvals(&self, upgrade: &Upgrade, now: Timestamp) -> Result<u32, WardenError> {
        let approvals = self.store.iter_approvals(&upgrade.id)?;
        Ok(approvals
            .into_iter()
            .filter(|a| now - a.ts < Duration::days(APPROVAL_TTL_DAYS))
            .count() as u32)
    }

    /// `POST /upgrade/{id}/apply` (spec §4.4.3 step 4).
    pub async fn apply(&self, upgrade_id: &UpgradeId) -> Result<Upgrade, WardenError> {
        let mut upgrade = self.get_upgrade(upgrade_id)?;
        if matches!(upgrade.state, UpgradeState::Applied | UpgradeState::EmergencyApplied) {
            return Ok(upgrade);
        }
        if upgrade.state == UpgradeState::Rejected {
            return Err(WardenError::InvalidUpgradeTransition {
                from: upgrade.state.to_string(),
                to: "applied".to_string(),
            });
        }

        let now = Utc::now();
        let approvals: Vec<Approval> = self
            .store
            .iter_approvals(upgrade_id)?
            .into_iter()
            .filter(|a| now - a.ts < Duration::days(APPROVAL_TTL_DAYS))
            .collect();

        if (approvals.len() as u32) < self.pool.required() {
            return Err(WardenError::QuorumNotReached {
                need: self.pool.required(),
                got: approvals.len() as u32,
            });
        }

        for approval in &approvals {
            let sig_bytes = base64::engine::general_purpose::STANDARD
                .decode(&approval.signature)
                .map_err(|_| WardenError::SignatureInvalid)?;
            if self
                .registry
                .verify(approval.approver_id.0.as_str(), upgrade.manifest_hash.as_bytes(), &sig_bytes)
                .is_err()
            {
                upgrade.state = UpgradeState::Rejected;
                upgrade.updated_at = now;
                self.store.put_upgrade(&upgrade)?;
                self.audit
                    .append(
                        ChainShard::Upgrade,
                        "upgrade.rejected",
                        json!({"upgrade_id": upgrade_id, "reason": "approval signature invalid", "approver_id": approval.approver_id}),
                    )
                    .await
                    .map_err(WardenError::from)?;
                return Err(WardenError::SignatureInvalid);
            }
        }

        let manifest = self.manifest_of(&upgrade);
        let bundle_hash = sha256_hex(
            &canonical::canonicalize(&(&manifest, &approvals)).map_err(|e| WardenError::Serialization(e.to_string()))?,
        );
        let signed = self
            .signer
            .sign(bundle_hash.as_bytes())
            .await
            .map_err(|e| WardenError::SigningFailure(e.to_string()))?;
        let bundle = AppliedUpgradeBundle {
            manifest,
            approvals,
            signer_kid: signed.signer_kid,
            signature: signed.signature_b64,
            applied_at: now,
            extra: serde_json::Value::Null,
        };

        upgrade.state = UpgradeState::Applied;
        upgrade.updated_at = now;
        self.store.put_upgrade(&upgrade)?;
        self.audit
            .append(
                ChainShard::Upgrade,
                "upgrade.applied",
                json!({
                    "upgrade_id": upgrade_id,
                    "bundle_hash": bundle_hash,
                    "signer_kid": bundle.signer_kid,
                }),
            )
            .await
            .map_err(WardenError::from)?;

        self.apply_side_effect(&upgrade, "upgrade-workflow").await;

        info!(upgrade_id = %upgrade.id, "upgrade applied");
        Ok(upgrade)
    }

    /// Break-glass apply (spec §4.4.3): bypasses the quorum wait, transitions
    /// straight to `emergency_applied`, and schedules a ratification deadline.
    pub async fn apply_emergency(
        &self,
        upgrade_id: &UpgradeId,
        actor: &str,
        actor_roles: &[String],
    ) -> Result<Upgrade, WardenError> {
        if !actor_roles.iter().any(|r| EMERGENCY_ROLES.contains(&r.as_str())) {
            return Err(WardenError::Forbidden);
        }

        let mut upgrade = self.get_upgrade(upgrade_id)?;
        if matches!(upgrade.state, UpgradeState::Applied | UpgradeState::EmergencyApplied) {
            return Ok(upgrade);
        }

        let now = Utc::now();
        upgrade.state = UpgradeState::EmergencyApplied;
        upgrade.emergency = true;
        upgrade.emergency_ratify_by = Some(now + Duration::hours(warden_core::constants::EMERGENCY_RATIFICATION_HOURS));
        upgrade.updated_at = now;
        self.store.put_upgrade(&upgrade)?;

        self.audit
            .append(
                ChainShard::Upgrade,
                "upgrade.emergency_applied",
                json!({"upgrade_id": upgrade_id, "actor": actor, "ratify_by": upgrade.emergency_ratify_by}),
            )
            .await
            .map_err(WardenError::from)?;

        self.apply_side_effect(&upgrade, actor).await;

        warn!(upgrade_id = %upgrade.id, %actor, "upgrade applied via break-glass, ratification pending");
        Ok(upgrade)
    }

    /// Apply the domain side effect named by `upgrade.upgrade_type`. Failures
    /// are logged, not propagated — by this point the upgrade's own state is
    /// already durably `applied`/`emergency_applied`; the side effect is a
    /// best-effort downstream action, matching the audit-is-logged-not-fatal
    /// discipline spec §7 applies to read paths.
    async fn apply_side_effect(&self, upgrade: &Upgrade, actor: &str) {
        let Some(policy_id) = upgrade.target.policy_id else {
            return;
        };
        let target_state = match upgrade.upgrade_type {
            UpgradeType::PolicyActivation => PolicyState::Active,
            UpgradeType::Rollback => PolicyState::Draft,
            UpgradeType::Code => return,
        };
        if let Err(e) = self
            .policy_engine
            .patch_state(&policy_id, target_state, actor, Some(upgrade.id))
            .await
        {
            warn!(upgrade_id = %upgrade.id, %policy_id, error = %e, "upgrade side effect failed");
        }
    }

    /// Background sweep (spec §4.4.3 break-glass window): ratify any
    /// `emergency_applied` upgrade that has since collected quorum, or roll
    /// its policy side effect back once the ratification window has passed
    /// without it. Returns the ids touched, for logging by the caller.
    pub async fn sweep_emergency_ratifications(&self) -> Result<Vec<UpgradeId>, WardenError> {
        let now = Utc::now();
        let mut touched = Vec::new();
        for mut upgrade in self.store.iter_emergency_applied_upgrades()? {
            let valid = self.count_valid_approvals(&upgrade, now)?;
            if valid >= self.pool.required() {
                upgrade.state = UpgradeState::Applied;
                upgrade.updated_at = now;
                self.store.put_upgrade(&upgrade)?;
                self.audit
                    .append(
                        ChainShard::Upgrade,
                        "upgrade.quorum_reached",
                        json!({"upgrade_id": upgrade.id, "valid_approvals": valid, "ratified": true}),
                    )
                    .await
                    .map_err(WardenError::from)?;
                touched.push(upgrade.id);
                continue;
            }

            let Some(deadline) = upgrade.emergency_ratify_by else { continue };
            if now < deadline {
                continue;
            }

            if let Some(policy_id) = upgrade.target.policy_id {
                if let Err(e) = self
                    .policy_engine
                    .patch_state(&policy_id, PolicyState::Draft, "upgrade.auto_rollback", None)
                    .await
                {
                    warn!(upgrade_id = %upgrade.id, error = %e, "emergency rollback of policy side effect failed");
                }
            }
            upgrade.state = UpgradeState::Rejected;
            upgrade.updated_at = now;
            self.store.put_upgrade(&upgrade)?;
            self.audit
                .append(
                    ChainShard::Upgrade,
                    "upgrade.rejected",
                    json!({"upgrade_id": upgrade.id, "reason": "emergency ratification window expired"}),
                )
                .await
                .map_err(WardenError::from)?;
            touched.push(upgrade.id);
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::policy::{PolicyMetadata, Severity};
    use warden_core::signer::{SignerAlgorithm, SignerRecord};
    use warden_crypto::keypair::Ed25519KeyPair;

    struct Fixture {
        workflow: UpgradeWorkflow,
        policy_engine: Arc<PolicyEngine>,
        approver_keys: Vec<(ApproverId, Ed25519KeyPair)>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateDb::open(dir.path()).unwrap());
        let signer = Arc::new(SigningService::local([9u8; 32], false).unwrap());
        let registry = Arc::new(SignerRegistry::new());
        signer.register_self(&registry);

        let audit = Arc::new(AuditChain::new(store.clone(), signer.clone()));
        let policy_engine = Arc::new(PolicyEngine::new(store.clone(), audit.clone()));

        let pool = ApproverPool::default_pool();
        let mut approver_keys = Vec::new();
        for member in pool.members() {
            let kp = Ed25519KeyPair::from_seed({
                let mut seed = [0u8; 32];
                seed[0] = member.0.as_bytes()[member.0.len() - 1];
                seed
            });
            registry.register(SignerRecord {
                kid: member.0.clone(),
                algorithm: SignerAlgorithm::Ed25519,
                public_key: kp.public_key_bytes().to_vec(),
                deployed_at: Utc::now(),
                description: "test approver key".to_string(),
            });
            approver_keys.push((member.clone(), kp));
        }

        let workflow = UpgradeWorkflow::new(store, audit, registry, signer, policy_engine.clone(), pool);
        Fixture { workflow, policy_engine, approver_keys }
    }

    #[tokio::test]
    async fn three_of_five_applies_and_activates_policy() {
        let f = fixture();
        let policy = f
            .policy_engine
            .create_policy(
                "kyc.block-sanctioned".to_string(),
                Severity::Critical,
                json!({"op": "eq", "path": "actor.id", "value": "sanctioned"}),
                PolicyMetadata::default(),
                "alice".to_string(),
            )
            .await
            .unwrap();
        f.policy_engine
            .patch_state(&policy.id, PolicyState::Simulating, "alice", None)
            .await
            .unwrap();
        f.policy_engine
            .patch_state(&policy.id, PolicyState::Canary, "alice", None)
            .await
            .unwrap();

        let upgrade = f
            .workflow
            .create_upgrade(
                UpgradeType::PolicyActivation,
                UpgradeTarget { policy_id: Some(policy.id), version: Some(policy.version) },
                "activate critical KYC policy".to_string(),
                "blocks sanctioned actors".to_string(),
                vec![],
                "alice".to_string(),
            )
            .await
            .unwrap();

        for (approver, keypair) in f.approver_keys.iter().take(2) {
            let sig = keypair.sign(upgrade.manifest_hash.as_bytes());
            let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);
            f.workflow
                .submit_approval(&upgrade.id, approver.clone(), sig_b64, None)
                .await
                .unwrap();
        }

        let err = f.workflow.apply(&upgrade.id).await.unwrap_err();
        assert!(matches!(err, WardenError::QuorumNotReached { .. }));

        let (approver, keypair) = &f.approver_keys[2];
        let sig = keypair.sign(upgrade.manifest_hash.as_bytes());
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);
        let upgrade = f
            .workflow
            .submit_approval(&upgrade.id, approver.clone(), sig_b64, None)
            .await
            .unwrap();
        assert_eq!(upgrade.state, UpgradeState::QuorumReached);

        let applied = f.workflow.apply(&upgrade.id).await.unwrap();
        assert_eq!(applied.state, UpgradeState::Applied);

        let policy = f.policy_engine.get_policy(&policy.id).unwrap();
        assert_eq!(policy.state, PolicyState::Active);
    }

    #[tokio::test]
    async fn duplicate_approval_rejected() {
        let f = fixture();
        let upgrade = f
            .workflow
            .create_upgrade(
                UpgradeType::Code,
                UpgradeTarget { policy_id: None, version: None },
                "ship a fix".to_string(),
                "low".to_string(),
                vec![],
                "bob".to_string(),
            )
            .await
            .unwrap();

        let (approver, keypair) = &f.approver_keys[0];
        let sig = keypair.sign(upgrade.manifest_hash.as_bytes());
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);
        f.workflow
            .submit_approval(&upgrade.id, approver.clone(), sig_b64.clone(), None)
            .await
            .unwrap();

        let err = f
            .workflow
            .submit_approval(&upgrade.id, approver.clone(), sig_b64, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::DuplicateApproval(_)));
    }

    #[tokio::test]
    async fn approver_outside_pool_rejected() {
        let f = fixture();
        let upgrade = f
            .workflow
            .create_upgrade(
                UpgradeType::Code,
                UpgradeTarget { policy_id: None, version: None },
                "ship a fix".to_string(),
                "low".to_string(),
                vec![],
                "bob".to_string(),
            )
            .await
            .unwrap();

        let err = f
            .workflow
            .submit_approval(&upgrade.id, ApproverId::from("not-in-pool"), "sig".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::ApproverNotInPool(_)));
    }
}
