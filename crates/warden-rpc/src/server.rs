use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use warden_audit::AuditChain;
use warden_core::error::WardenError;
use warden_core::ledger::ProofRange;
use warden_core::policy::{DecisionInput, PolicyMetadata};
use warden_core::types::JournalId;
use warden_core::upgrade::UpgradeTarget;
use warden_idempotency::{IdempotencyStore, Outcome};
use warden_ledger::{LedgerCore, ProofGenerator};
use warden_sentinel::engine::PolicyFilter;
use warden_sentinel::PolicyEngine;
use warden_upgrade::UpgradeWorkflow;

use crate::api::WardenApiServer;
use crate::conv;
use crate::error::{invalid_params, to_rpc_error};
use crate::types::{
    AuditVerifyRangeRequest, AuditVerifyRangeResponse, LedgerPostRequest, LedgerPostResponse,
    PolicyCreateRequest, PolicyListFilter, PolicyPatchStateRequest, ProofsFetchResponse,
    ProofsGenerateRequest, ProofsGenerateResponse, RpcPolicy, RpcUpgrade, SentinelCheckRequest,
    SentinelCheckResponse, UpgradeApproveRequest, UpgradeCreateRequest,
};

/// Shared state passed to the RPC server. One instance per process,
/// composing every core service `warden-node` builds at startup.
pub struct RpcServerState {
    pub audit: Arc<AuditChain>,
    pub policy_engine: Arc<PolicyEngine>,
    pub upgrade_workflow: Arc<UpgradeWorkflow>,
    pub ledger: Arc<LedgerCore>,
    pub proofs: Arc<ProofGenerator>,
    pub idempotency: Arc<IdempotencyStore>,
    pub signer_registry: Arc<warden_crypto::SignerRegistry>,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

/// Run `handler` through the idempotency protocol (spec §4.3): replay a
/// prior response verbatim, reject a key/body mismatch as a conflict, or
/// run fresh and commit the placeholder with the handler's own result.
async fn with_idempotency<T, F, Fut>(
    idem: &IdempotencyStore,
    method: &str,
    path: &str,
    key: &str,
    hash_body: Value,
    handler: F,
) -> RpcResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, WardenError>>,
{
    let outcome = idem
        .begin(method, path, key, &hash_body)
        .map_err(to_rpc_error)?;

    match outcome {
        Outcome::Replay { body, .. } => serde_json::from_slice(&body)
            .map_err(|e| invalid_params(format!("corrupt idempotency record: {e}"))),
        Outcome::Conflict => Err(to_rpc_error(WardenError::IdempotencyConflict)),
        Outcome::Fresh(guard) => match handler().await {
            Ok(result) => {
                let bytes = serde_json::to_vec(&result)
                    .map_err(|e| invalid_params(format!("failed to serialize response: {e}")))?;
                guard.commit(200, bytes).map_err(to_rpc_error)?;
                Ok(result)
            }
            Err(e) => {
                let _ = guard.rollback();
                Err(to_rpc_error(e))
            }
        },
    }
}

#[async_trait]
impl WardenApiServer for RpcServer {
    async fn ledger_post(
        &self,
        idempotency_key: String,
        request: LedgerPostRequest,
    ) -> RpcResult<LedgerPostResponse> {
        let hash_body = serde_json::to_value(&request)
            .map_err(|e| invalid_params(format!("invalid request: {e}")))?;
        let entries = conv::parse_ledger_lines(request.entries)?;
        let fx = conv::parse_fx(request.fx)?;
        let journal_id = conv::parse_journal_id(&request.journal_id);
        let ledger = self.state.ledger.clone();
        let context = request.context;

        with_idempotency(
            &self.state.idempotency,
            "POST",
            "/ledger/post",
            &idempotency_key,
            hash_body,
            move || async move {
                let journal = ledger.post_journal(journal_id, entries, context, fx).await?;
                Ok(LedgerPostResponse {
                    ok: true,
                    journal_id: journal.journal_id.to_string(),
                    posted_at: journal.posted_at.to_rfc3339(),
                })
            },
        )
        .await
    }

    async fn proofs_generate(
        &self,
        idempotency_key: String,
        request: ProofsGenerateRequest,
    ) -> RpcResult<ProofsGenerateResponse> {
        let hash_body = serde_json::to_value(&request)
            .map_err(|e| invalid_params(format!("invalid request: {e}")))?;
        let from_ts = conv::parse_timestamp(&request.from_ts)?;
        let to_ts = conv::parse_timestamp(&request.to_ts)?;
        let proofs = self.state.proofs.clone();

        with_idempotency(
            &self.state.idempotency,
            "POST",
            "/proofs/generate",
            &idempotency_key,
            hash_body,
            move || async move {
                let proof = proofs.generate(ProofRange { from_ts, to_ts }).await?;
                Ok(ProofsGenerateResponse {
                    ok: true,
                    proof_id: proof.proof_id.to_string(),
                    status: "generated".to_string(),
                })
            },
        )
        .await
    }

    async fn proofs_fetch(&self, proof_id: String) -> RpcResult<ProofsFetchResponse> {
        let id = conv::parse_uuid_field(&proof_id, warden_core::types::ProofId::from_uuid)?;
        let proof = self
            .state
            .proofs
            .fetch(&id)
            .map_err(WardenError::from)
            .map_err(to_rpc_error)?
            .ok_or_else(|| to_rpc_error(WardenError::NotFound(format!("proof {proof_id}"))))?;
        Ok(ProofsFetchResponse {
            ok: true,
            proof: conv::rpc_proof(&proof),
        })
    }

    async fn policy_create(
        &self,
        idempotency_key: String,
        request: PolicyCreateRequest,
    ) -> RpcResult<RpcPolicy> {
        let hash_body = serde_json::to_value(&request)
            .map_err(|e| invalid_params(format!("invalid request: {e}")))?;
        let severity = conv::parse_severity(&request.severity)?;
        let metadata: PolicyMetadata = conv::merge_policy_metadata(request.metadata)?;
        let engine = self.state.policy_engine.clone();
        let name = request.name;
        let rule = request.rule;
        let creator = request.creator;

        with_idempotency(
            &self.state.idempotency,
            "POST",
            "/policy",
            &idempotency_key,
            hash_body,
            move || async move {
                let policy = engine.create_policy(name, severity, rule, metadata, creator).await?;
                conv::rpc_policy(&policy)
            },
        )
        .await
    }

    async fn policy_get(&self, policy_id: String) -> RpcResult<RpcPolicy> {
        let id = conv::parse_policy_id(&policy_id)?;
        let policy = self.state.policy_engine.get_policy(&id).map_err(to_rpc_error)?;
        conv::rpc_policy(&policy).map_err(to_rpc_error)
    }

    async fn policy_list(&self, filter: PolicyListFilter) -> RpcResult<Vec<RpcPolicy>> {
        let state = filter.state.map(|s| conv::parse_policy_state(&s)).transpose()?;
        let severity = filter.severity.map(|s| conv::parse_severity(&s)).transpose()?;
        let policies = self
            .state
            .policy_engine
            .list_policies(PolicyFilter { state, severity })
            .map_err(to_rpc_error)?;
        policies
            .iter()
            .map(conv::rpc_policy)
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_rpc_error)
    }

    async fn policy_patch_state(
        &self,
        idempotency_key: String,
        policy_id: String,
        request: PolicyPatchStateRequest,
    ) -> RpcResult<RpcPolicy> {
        let hash_body = serde_json::to_value(&request)
            .map_err(|e| invalid_params(format!("invalid request: {e}")))?;
        let id = conv::parse_policy_id(&policy_id)?;
        let target = conv::parse_policy_state(&request.state)?;
        let upgrade_id = request
            .upgrade_id
            .as_deref()
            .map(conv::parse_upgrade_id)
            .transpose()?;
        let engine = self.state.policy_engine.clone();
        let actor = request.actor;

        with_idempotency(
            &self.state.idempotency,
            "PATCH",
            &format!("/policy/{policy_id}/state"),
            &idempotency_key,
            hash_body,
            move || async move {
                let policy = engine.patch_state(&id, target, &actor, upgrade_id).await?;
                conv::rpc_policy(&policy)
            },
        )
        .await
    }

    async fn sentinel_check(&self, request: SentinelCheckRequest) -> RpcResult<SentinelCheckResponse> {
        let input = DecisionInput {
            action: request.action,
            actor: warden_core::policy::ActorRef {
                id: request.actor.id,
                actor_type: request.actor.actor_type,
                roles: request.actor.roles,
            },
            resource: request.resource,
            context: request.context,
            request_id: request.request_id,
        };
        let result = self
            .state
            .policy_engine
            .evaluate_action(input)
            .await
            .map_err(to_rpc_error)?;
        Ok(SentinelCheckResponse {
            decision: format!("{:?}", result.decision).to_lowercase(),
            allowed: result.allowed,
            policy_id: result.policy_id.map(|p| p.to_string()),
            policy_version: result.policy_version,
            rationale: result.rationale,
            evidence_refs: result.evidence_refs,
            ts: result.ts.to_rfc3339(),
        })
    }

    async fn upgrade_create(
        &self,
        idempotency_key: String,
        request: UpgradeCreateRequest,
    ) -> RpcResult<RpcUpgrade> {
        let hash_body = serde_json::to_value(&request)
            .map_err(|e| invalid_params(format!("invalid request: {e}")))?;
        let upgrade_type = conv::parse_upgrade_type(&request.upgrade_type)?;
        let target: UpgradeTarget = conv::parse_upgrade_target(request.target)?;
        let workflow = self.state.upgrade_workflow.clone();
        let rationale = request.rationale;
        let impact = request.impact;
        let preconditions = request.preconditions;
        let proposed_by = request.proposed_by;

        with_idempotency(
            &self.state.idempotency,
            "POST",
            "/upgrade",
            &idempotency_key,
            hash_body,
            move || async move {
                let upgrade = workflow
                    .create_upgrade(upgrade_type, target, rationale, impact, preconditions, proposed_by)
                    .await?;
                Ok(conv::rpc_upgrade(&upgrade))
            },
        )
        .await
    }

    async fn upgrade_approve(
        &self,
        idempotency_key: String,
        upgrade_id: String,
        request: UpgradeApproveRequest,
    ) -> RpcResult<RpcUpgrade> {
        let hash_body = serde_json::to_value(&request)
            .map_err(|e| invalid_params(format!("invalid request: {e}")))?;
        let id = conv::parse_upgrade_id(&upgrade_id)?;
        let approver_id = conv::parse_approver_id(&request.approver_id);
        let workflow = self.state.upgrade_workflow.clone();
        let signature = request.signature;
        let notes = request.notes;

        with_idempotency(
            &self.state.idempotency,
            "POST",
            &format!("/upgrade/{upgrade_id}/approve"),
            &idempotency_key,
            hash_body,
            move || async move {
                let upgrade = workflow
                    .submit_approval(&id, approver_id, signature, notes)
                    .await?;
                Ok(conv::rpc_upgrade(&upgrade))
            },
        )
        .await
    }

    async fn upgrade_apply(
        &self,
        idempotency_key: String,
        upgrade_id: String,
        emergency: bool,
        actor: String,
        actor_roles: Vec<String>,
    ) -> RpcResult<RpcUpgrade> {
        let hash_body = json!({
            "upgrade_id": upgrade_id,
            "emergency": emergency,
            "actor": actor,
            "actor_roles": actor_roles,
        });
        let id = conv::parse_upgrade_id(&upgrade_id)?;
        let workflow = self.state.upgrade_workflow.clone();

        with_idempotency(
            &self.state.idempotency,
            "POST",
            &format!("/upgrade/{upgrade_id}/apply"),
            &idempotency_key,
            hash_body,
            move || async move {
                let upgrade = if emergency {
                    workflow.apply_emergency(&id, &actor, &actor_roles).await?
                } else {
                    workflow.apply(&id).await?
                };
                Ok(conv::rpc_upgrade(&upgrade))
            },
        )
        .await
    }

    async fn upgrade_get(&self, upgrade_id: String) -> RpcResult<RpcUpgrade> {
        let id = conv::parse_upgrade_id(&upgrade_id)?;
        let upgrade = self
            .state
            .upgrade_workflow
            .get_upgrade(&id)
            .map_err(to_rpc_error)?;
        Ok(conv::rpc_upgrade(&upgrade))
    }

    async fn audit_verify_range(
        &self,
        request: AuditVerifyRangeRequest,
    ) -> RpcResult<AuditVerifyRangeResponse> {
        let shard = conv::parse_shard(&request.shard)?;
        match self
            .state
            .audit
            .verify_range(&self.state.signer_registry, shard, request.from, request.to)
        {
            Ok(()) => Ok(AuditVerifyRangeResponse { ok: true, broken_at: None }),
            Err(WardenError::ChainBroken { at }) => Ok(AuditVerifyRangeResponse {
                ok: false,
                broken_at: Some(at),
            }),
            Err(e) => Err(to_rpc_error(e)),
        }
    }
}
