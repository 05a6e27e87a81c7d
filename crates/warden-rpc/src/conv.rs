//! Wire <-> domain conversions. Kept in one place so every RPC method
//! parses strings into domain enums the same way (spec §6: "all wire
//! payloads are JSON"; the core crates never see raw strings).

use std::str::FromStr;

use warden_core::audit::ChainShard;
use warden_core::error::WardenError;
use warden_core::ledger::{FxContext, LedgerLine};
use warden_core::policy::{PolicyMetadata, PolicyState, Severity};
use warden_core::types::{ApproverId, JournalId, PolicyId, Side, Timestamp, UpgradeId};
use warden_core::upgrade::{UpgradeTarget, UpgradeType};

use crate::error::invalid_params;
use crate::types::{RpcFxContext, RpcLedgerLine, RpcPolicy, RpcProof, RpcUpgrade, RpcUpgradeTarget};

pub fn parse_severity(s: &str) -> Result<Severity, jsonrpsee::types::ErrorObject<'static>> {
    match s.to_ascii_uppercase().as_str() {
        "LOW" => Ok(Severity::Low),
        "MEDIUM" => Ok(Severity::Medium),
        "HIGH" => Ok(Severity::High),
        "CRITICAL" => Ok(Severity::Critical),
        other => Err(invalid_params(format!("unknown severity: {other}"))),
    }
}

pub fn parse_policy_state(s: &str) -> Result<PolicyState, jsonrpsee::types::ErrorObject<'static>> {
    match s.to_ascii_lowercase().as_str() {
        "draft" => Ok(PolicyState::Draft),
        "simulating" => Ok(PolicyState::Simulating),
        "canary" => Ok(PolicyState::Canary),
        "active" => Ok(PolicyState::Active),
        "deprecated" => Ok(PolicyState::Deprecated),
        other => Err(invalid_params(format!("unknown policy state: {other}"))),
    }
}

pub fn parse_side(s: &str) -> Result<Side, jsonrpsee::types::ErrorObject<'static>> {
    match s.to_ascii_lowercase().as_str() {
        "debit" => Ok(Side::Debit),
        "credit" => Ok(Side::Credit),
        other => Err(invalid_params(format!("unknown ledger side: {other}"))),
    }
}

pub fn parse_shard(s: &str) -> Result<ChainShard, jsonrpsee::types::ErrorObject<'static>> {
    match s.to_ascii_lowercase().as_str() {
        "ledger" => Ok(ChainShard::Ledger),
        "policy" => Ok(ChainShard::Policy),
        "upgrade" => Ok(ChainShard::Upgrade),
        "general" => Ok(ChainShard::General),
        other => Err(invalid_params(format!("unknown chain shard: {other}"))),
    }
}

pub fn parse_upgrade_type(s: &str) -> Result<UpgradeType, jsonrpsee::types::ErrorObject<'static>> {
    match s.to_ascii_lowercase().as_str() {
        "policy_activation" => Ok(UpgradeType::PolicyActivation),
        "code" => Ok(UpgradeType::Code),
        "rollback" => Ok(UpgradeType::Rollback),
        other => Err(invalid_params(format!("unknown upgrade type: {other}"))),
    }
}

pub fn parse_timestamp(s: &str) -> Result<Timestamp, jsonrpsee::types::ErrorObject<'static>> {
    Timestamp::from_str(s).map_err(|e| invalid_params(format!("invalid timestamp {s}: {e}")))
}

pub fn parse_uuid_field<T, F>(s: &str, ctor: F) -> Result<T, jsonrpsee::types::ErrorObject<'static>>
where
    F: Fn(uuid::Uuid) -> T,
{
    uuid::Uuid::from_str(s)
        .map(ctor)
        .map_err(|e| invalid_params(format!("invalid id {s}: {e}")))
}

pub fn parse_ledger_lines(lines: Vec<RpcLedgerLine>) -> Result<Vec<LedgerLine>, jsonrpsee::types::ErrorObject<'static>> {
    lines
        .into_iter()
        .map(|l| {
            Ok(LedgerLine {
                account_id: l.account_id,
                side: parse_side(&l.side)?,
                amount: l.amount_cents,
                currency: l.currency,
                meta: l.meta,
            })
        })
        .collect()
}

pub fn parse_fx(fx: Option<RpcFxContext>) -> Result<Option<FxContext>, jsonrpsee::types::ErrorObject<'static>> {
    fx.map(|fx| {
        Ok(FxContext {
            base_currency: fx.base_currency,
            rate_numerator: fx.rate_numerator,
            rate_denominator: fx.rate_denominator,
            rate_timestamp: parse_timestamp(&fx.rate_timestamp)?,
        })
    })
    .transpose()
}

pub fn parse_upgrade_target(t: RpcUpgradeTarget) -> Result<UpgradeTarget, jsonrpsee::types::ErrorObject<'static>> {
    let policy_id = t
        .policy_id
        .map(|s| parse_uuid_field(&s, PolicyId::from_uuid))
        .transpose()?;
    Ok(UpgradeTarget { policy_id, version: t.version })
}

pub fn rpc_policy(p: &warden_core::policy::Policy) -> Result<RpcPolicy, WardenError> {
    Ok(RpcPolicy {
        id: p.id.to_string(),
        name: p.name.clone(),
        version: p.version,
        severity: format!("{:?}", p.severity).to_uppercase(),
        rule: p.rule.clone(),
        metadata: serde_json::to_value(&p.metadata).map_err(|e| WardenError::Serialization(e.to_string()))?,
        state: p.state.to_string(),
        creator: p.creator.clone(),
        created_at: p.created_at.to_rfc3339(),
        updated_at: p.updated_at.to_rfc3339(),
    })
}

pub fn rpc_upgrade(u: &warden_core::upgrade::Upgrade) -> RpcUpgrade {
    RpcUpgrade {
        id: u.id.to_string(),
        upgrade_type: format!("{:?}", u.upgrade_type),
        target: RpcUpgradeTarget {
            policy_id: u.target.policy_id.map(|p| p.to_string()),
            version: u.target.version,
        },
        rationale: u.rationale.clone(),
        impact: u.impact.clone(),
        preconditions: u.preconditions.clone(),
        proposed_by: u.proposed_by.clone(),
        state: u.state.to_string(),
        created_at: u.created_at.to_rfc3339(),
        updated_at: u.updated_at.to_rfc3339(),
        emergency: u.emergency,
        emergency_ratify_by: u.emergency_ratify_by.map(|t| t.to_rfc3339()),
        manifest_hash: u.manifest_hash.clone(),
    }
}

pub fn rpc_proof(p: &warden_core::ledger::LedgerProof) -> RpcProof {
    RpcProof {
        proof_id: p.proof_id.to_string(),
        range: crate::types::RpcProofRange {
            from_ts: p.range.from_ts.to_rfc3339(),
            to_ts: p.range.to_ts.to_rfc3339(),
        },
        hash: p.hash.clone(),
        signer_kid: p.signer_kid.clone(),
        signature: p.signature.clone(),
        ts: p.ts.to_rfc3339(),
        journal_ids: p.journal_ids.iter().map(|j| j.0.clone()).collect(),
    }
}

pub fn merge_policy_metadata(
    base: Option<serde_json::Value>,
) -> Result<PolicyMetadata, jsonrpsee::types::ErrorObject<'static>> {
    match base {
        None => Ok(PolicyMetadata::default()),
        Some(v) => serde_json::from_value(v).map_err(|e| invalid_params(format!("invalid metadata: {e}"))),
    }
}

pub fn parse_approver_id(s: &str) -> ApproverId {
    ApproverId::from(s.to_string())
}

pub fn parse_journal_id(s: &str) -> JournalId {
    JournalId::from(s.to_string())
}

pub fn parse_upgrade_id(s: &str) -> Result<UpgradeId, jsonrpsee::types::ErrorObject<'static>> {
    parse_uuid_field(s, UpgradeId::from_uuid)
}

pub fn parse_policy_id(s: &str) -> Result<PolicyId, jsonrpsee::types::ErrorObject<'static>> {
    parse_uuid_field(s, PolicyId::from_uuid)
}
