use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{PolicyId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// HIGH/CRITICAL policies may only reach `active` via an applied Upgrade (§4.4).
    pub fn requires_upgrade_to_activate(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
    Quarantine,
    Remediate,
}

impl Default for Effect {
    fn default() -> Self {
        Effect::Deny
    }
}

impl Effect {
    /// Priority used to pick the final decision among several applied matches:
    /// deny > quarantine > remediate > allow (spec §4.4.1 step 5).
    pub fn priority(self) -> u8 {
        match self {
            Effect::Deny => 3,
            Effect::Quarantine => 2,
            Effect::Remediate => 1,
            Effect::Allow => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyState {
    Draft,
    Simulating,
    Canary,
    Active,
    Deprecated,
}

impl PolicyState {
    /// Valid transitions per the diagram in spec.md §4.4.2.
    pub fn can_transition_to(self, next: PolicyState) -> bool {
        use PolicyState::*;
        matches!(
            (self, next),
            (Draft, Simulating)
                | (Simulating, Canary)
                | (Canary, Active)
                | (Canary, Draft) // auto-rollback or manual stop
                | (Active, Draft) // rollback
                | (Active, Deprecated)
        )
    }
}

impl std::fmt::Display for PolicyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PolicyState::Draft => "draft",
            PolicyState::Simulating => "simulating",
            PolicyState::Canary => "canary",
            PolicyState::Active => "active",
            PolicyState::Deprecated => "deprecated",
        };
        write!(f, "{s}")
    }
}

/// Opaque expression tree the evaluator interprets. See `warden_sentinel::rule`
/// for the concrete minimal interpreter; this crate only carries the data.
pub type Rule = Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyMetadata {
    #[serde(default)]
    pub effect: Effect,
    /// 0-100; only meaningful while `state == canary`.
    #[serde(default)]
    pub canary_percent: u8,
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for PolicyMetadata {
    fn default() -> Self {
        Self {
            effect: Effect::default(),
            canary_percent: 0,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    /// Monotonically increasing per `name`.
    pub version: u32,
    pub severity: Severity,
    pub rule: Rule,
    pub metadata: PolicyMetadata,
    pub state: PolicyState,
    pub creator: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyHistoryAction {
    Created,
    StateChanged,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyHistoryEntry {
    pub policy_id: PolicyId,
    pub version: u32,
    pub action: PolicyHistoryAction,
    pub from_state: Option<PolicyState>,
    pub to_state: PolicyState,
    pub actor: String,
    pub ts: Timestamp,
}

/// Inputs to a single `evaluateAction` decision (spec §4.4.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionInput {
    pub action: String,
    pub actor: ActorRef,
    pub resource: Value,
    #[serde(default)]
    pub context: Value,
    pub request_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    Quarantine,
    Remediate,
}

impl From<Effect> for Decision {
    fn from(e: Effect) -> Self {
        match e {
            Effect::Allow => Decision::Allow,
            Effect::Deny => Decision::Deny,
            Effect::Quarantine => Decision::Quarantine,
            Effect::Remediate => Decision::Remediate,
        }
    }
}

impl Decision {
    pub fn allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}
