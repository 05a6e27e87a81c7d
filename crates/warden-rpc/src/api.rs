use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    AuditVerifyRangeRequest, AuditVerifyRangeResponse, LedgerPostRequest, LedgerPostResponse,
    PolicyCreateRequest, PolicyListFilter, PolicyPatchStateRequest, ProofsFetchResponse,
    ProofsGenerateRequest, ProofsGenerateResponse, RpcPolicy, RpcUpgrade, SentinelCheckRequest,
    SentinelCheckResponse, UpgradeApproveRequest, UpgradeCreateRequest,
};

/// Warden JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "warden_" via `namespace = "warden"`.
/// Mutating methods take an explicit `idempotency_key` parameter in place
/// of an HTTP header; HTTP framing itself is out of scope for this surface.
#[rpc(server, namespace = "warden")]
pub trait WardenApi {
    /// `POST /ledger/post` (spec §6). Posts a balanced double-entry journal.
    #[method(name = "ledgerPost")]
    async fn ledger_post(
        &self,
        idempotency_key: String,
        request: LedgerPostRequest,
    ) -> RpcResult<LedgerPostResponse>;

    /// `POST /proofs/generate` (spec §6). Generates a signed range proof
    /// over all journals posted in `[from_ts, to_ts)`.
    #[method(name = "proofsGenerate")]
    async fn proofs_generate(
        &self,
        idempotency_key: String,
        request: ProofsGenerateRequest,
    ) -> RpcResult<ProofsGenerateResponse>;

    /// `GET /proofs/{id}` (spec §6).
    #[method(name = "proofsFetch")]
    async fn proofs_fetch(&self, proof_id: String) -> RpcResult<ProofsFetchResponse>;

    /// `POST /policy` (spec §6). Creates a new policy in `draft`.
    #[method(name = "policyCreate")]
    async fn policy_create(
        &self,
        idempotency_key: String,
        request: PolicyCreateRequest,
    ) -> RpcResult<RpcPolicy>;

    /// `GET /policy/{id}` (spec §6).
    #[method(name = "policyGet")]
    async fn policy_get(&self, policy_id: String) -> RpcResult<RpcPolicy>;

    /// `GET /policy` (spec §6), filtered by optional state/severity.
    #[method(name = "policyList")]
    async fn policy_list(&self, filter: PolicyListFilter) -> RpcResult<Vec<RpcPolicy>>;

    /// `PATCH /policy/{id}/state` (spec §6). HIGH/CRITICAL activation
    /// requires `upgrade_id` to name an applied matching Upgrade.
    #[method(name = "policyPatchState")]
    async fn policy_patch_state(
        &self,
        idempotency_key: String,
        policy_id: String,
        request: PolicyPatchStateRequest,
    ) -> RpcResult<RpcPolicy>;

    /// `POST /sentinel/check` (spec §6). Runs the `evaluateAction` pipeline.
    /// Not idempotency-wrapped: a decision is read-mostly (it records an
    /// audit event but has no caller-assigned identity to dedupe on).
    #[method(name = "sentinelCheck")]
    async fn sentinel_check(&self, request: SentinelCheckRequest) -> RpcResult<SentinelCheckResponse>;

    /// `POST /upgrade` (spec §6). Proposes an upgrade manifest.
    #[method(name = "upgradeCreate")]
    async fn upgrade_create(
        &self,
        idempotency_key: String,
        request: UpgradeCreateRequest,
    ) -> RpcResult<RpcUpgrade>;

    /// `POST /upgrade/{id}/approve` (spec §6). Submits one multi-sig approval.
    #[method(name = "upgradeApprove")]
    async fn upgrade_approve(
        &self,
        idempotency_key: String,
        upgrade_id: String,
        request: UpgradeApproveRequest,
    ) -> RpcResult<RpcUpgrade>;

    /// `POST /upgrade/{id}/apply` (spec §6). Applies an upgrade once quorum
    /// is reached (normal path) or immediately under break-glass.
    #[method(name = "upgradeApply")]
    async fn upgrade_apply(
        &self,
        idempotency_key: String,
        upgrade_id: String,
        emergency: bool,
        actor: String,
        actor_roles: Vec<String>,
    ) -> RpcResult<RpcUpgrade>;

    /// `GET /upgrade/{id}` (spec §6).
    #[method(name = "upgradeGet")]
    async fn upgrade_get(&self, upgrade_id: String) -> RpcResult<RpcUpgrade>;

    /// `POST /audit/verify-range` (spec §6). Offline replay/verification
    /// of one chain shard over `[from, to]`.
    #[method(name = "auditVerifyRange")]
    async fn audit_verify_range(
        &self,
        request: AuditVerifyRangeRequest,
    ) -> RpcResult<AuditVerifyRangeResponse>;
}
