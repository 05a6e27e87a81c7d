use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use warden_audit::AuditChain;
use warden_core::audit::ChainShard;
use warden_core::constants::POLICY_CACHE_TTL_SECS;
use warden_core::error::WardenError;
use warden_core::policy::{
    Decision, DecisionInput, Effect, Policy, PolicyHistoryAction, PolicyHistoryEntry,
    PolicyMetadata, PolicyState, Severity,
};
use warden_core::types::{PolicyId, Timestamp, UpgradeId};
use warden_core::upgrade::UpgradeState;
use warden_store::StateDb;

use crate::canary::{self, CanaryWindow};
use crate::metrics::Counters;
use crate::rule::{self, Rule};

/// Filters accepted by `GET /policy` (spec §6).
#[derive(Clone, Debug, Default)]
pub struct PolicyFilter {
    pub state: Option<PolicyState>,
    pub severity: Option<Severity>,
}

impl PolicyFilter {
    fn matches(&self, p: &Policy) -> bool {
        self.state.map(|s| s == p.state).unwrap_or(true) && self.severity.map(|s| s == p.severity).unwrap_or(true)
    }
}

/// Outcome of `POST /sentinel/check` (spec §6).
#[derive(Clone, Debug, Serialize)]
pub struct DecisionResult {
    pub decision: Decision,
    pub allowed: bool,
    pub policy_id: Option<PolicyId>,
    pub policy_version: Option<u32>,
    pub rationale: Option<String>,
    pub evidence_refs: Vec<Value>,
    pub ts: Timestamp,
}

struct ActivePolicyCache {
    policies: Vec<Policy>,
    fetched_at: Instant,
}

/// A single applied match from one pass of `evaluate_action`: the policy,
/// its effect, and whether this was a canary-sampled enforcement.
struct AppliedMatch {
    policy: Policy,
    effect: Effect,
    evidence: Value,
    rule_explanation: String,
    is_canary: bool,
}

/// Policy CRUD, lifecycle, and the `evaluateAction` decision pipeline
/// (spec §4.4.1/§4.4.2). The N-of-M upgrade gate for HIGH/CRITICAL
/// activation is enforced here by reading upgrade rows directly from
/// `warden-store`; the upgrade workflow itself (creating/approving
/// upgrades) lives in `warden-upgrade`, which calls back into this engine
/// to apply the policy-activation side effect once quorum is reached.
pub struct PolicyEngine {
    store: Arc<StateDb>,
    audit: Arc<AuditChain>,
    cache: Mutex<Option<ActivePolicyCache>>,
    cache_ttl: Duration,
    canary_windows: Mutex<HashMap<PolicyId, CanaryWindow>>,
    pub counters: Counters,
}

impl PolicyEngine {
    pub fn new(store: Arc<StateDb>, audit: Arc<AuditChain>) -> Self {
        Self {
            store,
            audit,
            cache: Mutex::new(None),
            cache_ttl: Duration::from_secs(POLICY_CACHE_TTL_SECS),
            canary_windows: Mutex::new(HashMap::new()),
            counters: Counters::new(),
        }
    }

    /// Invalidate the active-policy cache immediately; called after any
    /// policy write so the evaluator never lags a create/patch by more
    /// than the in-flight request (spec §5: "invalidated on any policy write").
    pub fn invalidate_cache(&self) {
        *self.cache.lock().expect("policy cache lock poisoned") = None;
    }

    fn cached_active_policies(&self) -> Result<Vec<Policy>, WardenError> {
        {
            let guard = self.cache.lock().expect("policy cache lock poisoned");
            if let Some(cache) = guard.as_ref() {
                if cache.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cache.policies.clone());
                }
            }
        }
        let fresh = self.store.iter_active_policies()?;
        *self.cache.lock().expect("policy cache lock poisoned") = Some(ActivePolicyCache {
            policies: fresh.clone(),
            fetched_at: Instant::now(),
        });
        Ok(fresh)
    }

    // ── CRUD ─────────────────────────────────────────────────────────────────

    pub async fn create_policy(
        &self,
        name: String,
        severity: Severity,
        rule: Value,
        metadata: PolicyMetadata,
        creator: String,
    ) -> Result<Policy, WardenError> {
        let version = self.store.latest_policy_version(&name)?.map_or(1, |v| v + 1);
        let now = Utc::now();
        let policy = Policy {
            id: PolicyId::new(),
            name,
            version,
            severity,
            rule,
            metadata,
            state: PolicyState::Draft,
            creator: creator.clone(),
            created_at: now,
            updated_at: now,
        };

        self.store.put_policy(&policy)?;
        self.store.append_policy_history(&PolicyHistoryEntry {
            policy_id: policy.id,
            version: policy.version,
            action: PolicyHistoryAction::Created,
            from_state: None,
            to_state: PolicyState::Draft,
            actor: creator,
            ts: now,
        })?;

        self.audit
            .append(
                ChainShard::Policy,
                "policy.created",
                json!({"policy_id": policy.id, "name": policy.name, "version": policy.version, "severity": policy.severity}),
            )
            .await
            .map_err(WardenError::from)?;

        self.invalidate_cache();
        info!(policy_id = %policy.id, name = %policy.name, version = policy.version, "policy created");
        Ok(policy)
    }

    pub fn get_policy(&self, id: &PolicyId) -> Result<Policy, WardenError> {
        self.store
            .get_policy(id)?
            .ok_or_else(|| WardenError::PolicyNotFound(id.to_string()))
    }

    pub fn list_policies(&self, filter: PolicyFilter) -> Result<Vec<Policy>, WardenError> {
        Ok(self
            .store
            .iter_policies()?
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect())
    }

    pub fn history(&self, id: &PolicyId) -> Result<Vec<PolicyHistoryEntry>, WardenError> {
        self.store.iter_policy_history(id)
    }

    /// `PATCH /policy/{id}/state` (spec §4.4.2/§6). HIGH/CRITICAL policies
    /// may only reach `active` via an applied Upgrade whose target matches.
    pub async fn patch_state(
        &self,
        id: &PolicyId,
        target: PolicyState,
        actor: &str,
        upgrade_id: Option<UpgradeId>,
    ) -> Result<Policy, WardenError> {
        let mut policy = self.get_policy(id)?;
        let from = policy.state;

        if !from.can_transition_to(target) {
            return Err(WardenError::InvalidPolicyTransition {
                from: from.to_string(),
                to: target.to_string(),
            });
        }

        if target == PolicyState::Active && policy.severity.requires_upgrade_to_activate() {
            self.check_activation_upgrade(&policy, upgrade_id)?;
        }

        let now = Utc::now();
        policy.state = target;
        policy.updated_at = now;
        self.store.put_policy(&policy)?;
        self.store.append_policy_history(&PolicyHistoryEntry {
            policy_id: policy.id,
            version: policy.version,
            action: PolicyHistoryAction::StateChanged,
            from_state: Some(from),
            to_state: target,
            actor: actor.to_string(),
            ts: now,
        })?;

        self.audit
            .append(
                ChainShard::Policy,
                "policy.state_changed",
                json!({
                    "policy_id": policy.id,
                    "version": policy.version,
                    "from": from.to_string(),
                    "to": target.to_string(),
                    "actor": actor,
                }),
            )
            .await
            .map_err(WardenError::from)?;

        self.invalidate_cache();
        info!(policy_id = %policy.id, %from, to = %target, "policy transitioned");
        Ok(policy)
    }

    /// Verify `upgrade_id` names an `applied` Upgrade targeting this exact
    /// policy (and, if specified, this exact version) — spec §4.4.2.
    fn check_activation_upgrade(&self, policy: &Policy, upgrade_id: Option<UpgradeId>) -> Result<(), WardenError> {
        let upgrade_id = upgrade_id.ok_or(WardenError::UpgradeRequired)?;
        let upgrade = self
            .store
            .get_upgrade(&upgrade_id)?
            .ok_or(WardenError::UpgradeRequired)?;

        if !matches!(upgrade.state, UpgradeState::Applied | UpgradeState::EmergencyApplied) {
            return Err(WardenError::UpgradeRequired);
        }
        if upgrade.target.policy_id != Some(policy.id) {
            return Err(WardenError::UpgradeTargetMismatch {
                policy_id: policy.id.to_string(),
                version: upgrade.target.version,
            });
        }
        if let Some(v) = upgrade.target.version {
            if v != policy.version {
                return Err(WardenError::UpgradeTargetMismatch {
                    policy_id: policy.id.to_string(),
                    version: Some(v),
                });
            }
        }
        Ok(())
    }

    /// Roll a canary policy back to `draft` and clear its window. Called by
    /// the auto-rollback trigger inside `evaluate_action`, and usable
    /// directly for a manual stop.
    async fn rollback_to_draft(&self, policy_id: PolicyId, actor: &str) -> Result<(), WardenError> {
        let mut policy = self.get_policy(&policy_id)?;
        if policy.state != PolicyState::Canary {
            return Ok(());
        }
        let now = Utc::now();
        policy.state = PolicyState::Draft;
        policy.updated_at = now;
        self.store.put_policy(&policy)?;
        self.store.append_policy_history(&PolicyHistoryEntry {
            policy_id: policy.id,
            version: policy.version,
            action: PolicyHistoryAction::StateChanged,
            from_state: Some(PolicyState::Canary),
            to_state: PolicyState::Draft,
            actor: actor.to_string(),
            ts: now,
        })?;

        if let Err(e) = self
            .audit
            .append(
                ChainShard::Policy,
                "policy.auto_rollback",
                json!({"policy_id": policy.id, "version": policy.version}),
            )
            .await
        {
            warn!(policy_id = %policy.id, error = %e, "audit append failed for canary auto-rollback");
        }

        self.invalidate_cache();
        info!(policy_id = %policy.id, "canary policy auto-rolled-back to draft");
        Ok(())
    }

    // ── Decision pipeline (spec §4.4.1) ─────────────────────────────────────

    pub async fn evaluate_action(&self, input: DecisionInput) -> Result<DecisionResult, WardenError> {
        let policies = self.cached_active_policies()?;
        let eval_value = json!({
            "action": input.action,
            "actor": input.actor,
            "resource": input.resource,
            "context": input.context,
        });

        let mut applied: Vec<AppliedMatch> = Vec::new();
        for policy in policies {
            let rule: Rule = match serde_json::from_value(policy.rule.clone()) {
                Ok(r) => r,
                Err(e) => {
                    warn!(policy_id = %policy.id, error = %e, "policy rule failed to parse, skipping");
                    continue;
                }
            };
            let outcome = rule::evaluate(&rule, &eval_value);
            if !outcome.matched {
                continue;
            }

            let is_canary = policy.state == PolicyState::Canary;
            if is_canary {
                let sampled = canary::sample(input.request_id.as_deref(), policy.metadata.canary_percent);
                if !sampled {
                    self.counters.record_canary_unsampled();
                    continue;
                }
            }

            applied.push(AppliedMatch {
                effect: policy.metadata.effect,
                evidence: outcome.evidence,
                rule_explanation: outcome.explanation,
                is_canary,
                policy,
            });
        }

        let decision = applied
            .iter()
            .map(|m| m.effect)
            .max_by_key(|e| e.priority())
            .map(Decision::from)
            .unwrap_or(Decision::Allow);

        let primary = applied.iter().max_by_key(|m| m.policy.severity);

        let result = DecisionResult {
            decision,
            allowed: decision.allowed(),
            policy_id: primary.map(|m| m.policy.id),
            policy_version: primary.map(|m| m.policy.version),
            rationale: primary.map(|m| m.rule_explanation.clone()),
            evidence_refs: applied.iter().map(|m| m.evidence.clone()).collect(),
            ts: Utc::now(),
        };

        self.counters.record(decision);

        // Step 7: audit the decision. Best-effort — a failure here must not
        // change what the caller receives (spec §4.4.1 step 7, §7).
        if let Err(e) = self
            .audit
            .append(
                ChainShard::Policy,
                "policy.decision",
                json!({
                    "policy": primary.map(|m| m.policy.id),
                    "decision": result.decision,
                    "allowed": result.allowed,
                    "policy_version": result.policy_version,
                    "rule_id": primary.map(|m| m.policy.id),
                    "rationale": result.rationale,
                    "evidence_refs": result.evidence_refs,
                    "principal": input.actor,
                    "context_summary": input.context,
                    "action": input.action,
                    "request_id": input.request_id,
                }),
            )
            .await
        {
            warn!(error = %e, "audit append failed for policy decision (non-fatal)");
        }

        // Canary auto-rollback bookkeeping: every canary policy that
        // participated in this decision (matched and was sampled) records
        // one enforcement sample.
        let non_allow = !result.allowed;
        let mut rollback_targets = Vec::new();
        {
            let mut windows = self.canary_windows.lock().expect("canary window lock poisoned");
            for m in applied.iter().filter(|m| m.is_canary) {
                let window = windows
                    .entry(m.policy.id)
                    .or_insert_with(|| CanaryWindow::new(m.policy.id));
                if let Some(policy_id) = window.record_enforcement(non_allow, result.ts) {
                    rollback_targets.push(policy_id);
                }
            }
        }
        for policy_id in rollback_targets {
            if let Err(e) = self.rollback_to_draft(policy_id, "sentinel.auto_rollback").await {
                warn!(%policy_id, error = %e, "canary auto-rollback failed");
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::policy::ActorRef;
    use warden_crypto::SigningService;

    fn temp_engine() -> PolicyEngine {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateDb::open(dir.path()).unwrap());
        let signer = Arc::new(SigningService::local([3u8; 32], false).unwrap());
        let audit = Arc::new(AuditChain::new(store.clone(), signer));
        PolicyEngine::new(store, audit)
    }

    fn decision_input(amount: i64) -> DecisionInput {
        DecisionInput {
            action: "checkout.purchase".to_string(),
            actor: ActorRef {
                id: "agent-1".to_string(),
                actor_type: "division_agent".to_string(),
                roles: vec!["buyer".to_string()],
            },
            resource: json!({"sku": "artifact-1"}),
            context: json!({"amount": amount}),
            request_id: Some("req-1".to_string()),
        }
    }

    #[tokio::test]
    async fn no_matching_policy_allows() {
        let engine = temp_engine();
        let result = engine.evaluate_action(decision_input(10)).await.unwrap();
        assert!(result.allowed);
        assert!(result.policy_id.is_none());
    }

    #[tokio::test]
    async fn active_deny_policy_blocks() {
        let engine = temp_engine();
        let mut metadata = PolicyMetadata::default();
        metadata.effect = Effect::Deny;
        let policy = engine
            .create_policy(
                "checkout.large-amount".to_string(),
                Severity::Low,
                json!({"op": "numeric_compare", "path": "context.amount", "cmp": "gte", "value": 1000.0}),
                metadata,
                "alice".to_string(),
            )
            .await
            .unwrap();
        engine
            .patch_state(&policy.id, PolicyState::Simulating, "alice", None)
            .await
            .unwrap();
        engine
            .patch_state(&policy.id, PolicyState::Canary, "alice", None)
            .await
            .unwrap();
        engine
            .patch_state(&policy.id, PolicyState::Active, "alice", None)
            .await
            .unwrap();

        let result = engine.evaluate_action(decision_input(5000)).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.policy_id, Some(policy.id));

        let result = engine.evaluate_action(decision_input(10)).await.unwrap();
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn critical_policy_needs_upgrade_to_activate() {
        let engine = temp_engine();
        let policy = engine
            .create_policy(
                "kyc.block-sanctioned".to_string(),
                Severity::Critical,
                json!({"op": "eq", "path": "actor.id", "value": "sanctioned"}),
                PolicyMetadata::default(),
                "alice".to_string(),
            )
            .await
            .unwrap();
        engine
            .patch_state(&policy.id, PolicyState::Simulating, "alice", None)
            .await
            .unwrap();
        engine
            .patch_state(&policy.id, PolicyState::Canary, "alice", None)
            .await
            .unwrap();

        let err = engine
            .patch_state(&policy.id, PolicyState::Active, "alice", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::UpgradeRequired));
    }

    #[tokio::test]
    async fn zero_percent_canary_never_enforces() {
        let engine = temp_engine();
        let mut metadata = PolicyMetadata::default();
        metadata.effect = Effect::Deny;
        metadata.canary_percent = 0;
        let policy = engine
            .create_policy(
                "checkout.canary-test".to_string(),
                Severity::Low,
                json!({"op": "eq", "path": "action", "value": "checkout.purchase"}),
                metadata,
                "alice".to_string(),
            )
            .await
            .unwrap();
        engine
            .patch_state(&policy.id, PolicyState::Simulating, "alice", None)
            .await
            .unwrap();
        engine
            .patch_state(&policy.id, PolicyState::Canary, "alice", None)
            .await
            .unwrap();

        let result = engine.evaluate_action(decision_input(1)).await.unwrap();
        assert!(result.allowed);
        let snap = engine.counters.snapshot();
        assert!(snap.canary_unsampled >= 1);
    }
}
