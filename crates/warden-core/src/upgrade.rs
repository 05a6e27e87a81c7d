use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ApproverId, PolicyId, Timestamp, UpgradeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeType {
    PolicyActivation,
    Code,
    Rollback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    Created,
    PendingApproval,
    QuorumReached,
    Applied,
    Rejected,
    EmergencyApplied,
}

impl std::fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpgradeState::Created => "created",
            UpgradeState::PendingApproval => "pending_approval",
            UpgradeState::QuorumReached => "quorum_reached",
            UpgradeState::Applied => "applied",
            UpgradeState::Rejected => "rejected",
            UpgradeState::EmergencyApplied => "emergency_applied",
        };
        write!(f, "{s}")
    }
}

/// What an upgrade acts on. `version: None` means "any version of this policy".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpgradeTarget {
    pub policy_id: Option<PolicyId>,
    pub version: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Upgrade {
    pub id: UpgradeId,
    #[serde(rename = "type")]
    pub upgrade_type: UpgradeType,
    pub target: UpgradeTarget,
    pub rationale: String,
    pub impact: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    pub proposed_by: String,
    pub state: UpgradeState,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set when `emergency=true` applied this upgrade outside the normal flow.
    pub emergency: bool,
    /// Deadline for ratification when `state == emergency_applied`.
    pub emergency_ratify_by: Option<Timestamp>,
    /// SHA-256 of the canonicalized manifest fields above (content address).
    pub manifest_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Approval {
    pub upgrade_id: UpgradeId,
    pub approver_id: ApproverId,
    /// base64 signature over the manifest hash bytes.
    pub signature: String,
    pub notes: Option<String>,
    pub ts: Timestamp,
}

/// The manifest fields that are content-addressed — kept separate from
/// `Upgrade` so the hash only ever covers the caller-supplied proposal, not
/// engine-managed bookkeeping (state, timestamps).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpgradeManifest {
    pub upgrade_id: UpgradeId,
    #[serde(rename = "type")]
    pub upgrade_type: UpgradeType,
    pub target: UpgradeTarget,
    pub rationale: String,
    pub impact: String,
    pub preconditions: Vec<String>,
    pub proposed_by: String,
    pub timestamp: Timestamp,
}

/// The applied bundle: manifest plus >= N valid approvals, signed once by
/// the kernel signer (spec §4.4.3 "Applied Record").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppliedUpgradeBundle {
    pub manifest: UpgradeManifest,
    pub approvals: Vec<Approval>,
    pub signer_kid: String,
    pub signature: String,
    pub applied_at: Timestamp,
    #[serde(default)]
    pub extra: Value,
}
