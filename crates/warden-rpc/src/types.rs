use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of a `POST /ledger/post` journal (spec §6). `amount_cents` is
/// the wire name from the spec's literal example payloads; it is always a
/// minor-unit integer regardless of currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcLedgerLine {
    pub account_id: String,
    pub side: String,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(default)]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcFxContext {
    pub base_currency: String,
    pub rate_numerator: i128,
    pub rate_denominator: i128,
    pub rate_timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPostRequest {
    pub journal_id: String,
    pub entries: Vec<RpcLedgerLine>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub fx: Option<RpcFxContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPostResponse {
    pub ok: bool,
    pub journal_id: String,
    pub posted_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofsGenerateRequest {
    pub from_ts: String,
    pub to_ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofsGenerateResponse {
    pub ok: bool,
    pub proof_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcProofRange {
    pub from_ts: String,
    pub to_ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcProof {
    pub proof_id: String,
    pub range: RpcProofRange,
    pub hash: String,
    pub signer_kid: String,
    pub signature: String,
    pub ts: String,
    pub journal_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofsFetchResponse {
    pub ok: bool,
    pub proof: RpcProof,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCreateRequest {
    pub name: String,
    pub severity: String,
    pub rule: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub creator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPolicy {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub severity: String,
    pub rule: Value,
    pub metadata: Value,
    pub state: String,
    pub creator: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyListFilter {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyPatchStateRequest {
    pub state: String,
    pub actor: String,
    #[serde(default)]
    pub upgrade_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcActorRef {
    pub id: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelCheckRequest {
    pub action: String,
    pub actor: RpcActorRef,
    pub resource: Value,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelCheckResponse {
    pub decision: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub evidence_refs: Vec<Value>,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcUpgradeTarget {
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeCreateRequest {
    #[serde(rename = "type")]
    pub upgrade_type: String,
    pub target: RpcUpgradeTarget,
    pub rationale: String,
    pub impact: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    pub proposed_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcUpgrade {
    pub id: String,
    #[serde(rename = "type")]
    pub upgrade_type: String,
    pub target: RpcUpgradeTarget,
    pub rationale: String,
    pub impact: String,
    pub preconditions: Vec<String>,
    pub proposed_by: String,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    pub emergency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_ratify_by: Option<String>,
    pub manifest_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeApproveRequest {
    pub approver_id: String,
    pub signature: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerifyRangeRequest {
    pub shard: String,
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerifyRangeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<String>,
}
