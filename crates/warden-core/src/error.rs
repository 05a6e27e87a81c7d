use thiserror::Error;

/// Every domain error the core can raise. Transport adapters (out of scope
/// here, per spec) map these onto HTTP/RPC status codes; the mapping lives
/// in `warden-rpc`, not here.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── AuthN/AuthZ ──────────────────────────────────────────────────────────
    #[error("caller identity could not be authenticated")]
    Unauthenticated,

    #[error("caller lacks the required role for this action")]
    Forbidden,

    // ── Validation ───────────────────────────────────────────────────────────
    #[error("validation error: {0}")]
    ValidationError(String),

    // ── Idempotency ──────────────────────────────────────────────────────────
    #[error("idempotency key already used with a different request body")]
    IdempotencyConflict,

    #[error("idempotent response body exceeds the configured size limit ({limit} bytes)")]
    PayloadTooLarge { limit: usize },

    // ── Ledger ───────────────────────────────────────────────────────────────
    #[error("ledger imbalance in currency {currency}: debits {debits}, credits {credits}")]
    LedgerImbalance {
        currency: String,
        debits: i128,
        credits: i128,
    },

    #[error("journal {0} contains no entries")]
    EmptyJournal(String),

    #[error("journal entry amount must be greater than zero")]
    ZeroAmount,

    #[error("journal {0} already posted")]
    DuplicateJournal(String),

    #[error("journal {0} not found")]
    JournalNotFound(String),

    // ── Policy / Upgrade ─────────────────────────────────────────────────────
    #[error("policy activation requires an applied upgrade")]
    UpgradeRequired,

    #[error("quorum not reached: need {need}, have {got}")]
    QuorumNotReached { need: u32, got: u32 },

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("policy (name, version) already exists: {name} v{version}")]
    PolicyVersionConflict { name: String, version: u32 },

    #[error("invalid policy state transition: {from:?} -> {to:?}")]
    InvalidPolicyTransition { from: String, to: String },

    #[error("upgrade not found: {0}")]
    UpgradeNotFound(String),

    #[error("invalid upgrade state transition: {from:?} -> {to:?}")]
    InvalidUpgradeTransition { from: String, to: String },

    #[error("approver {0} is not a member of the configured approval pool")]
    ApproverNotInPool(String),

    #[error("approver {0} has already approved this upgrade")]
    DuplicateApproval(String),

    #[error("approval by {0} has expired")]
    ApprovalExpired(String),

    #[error("upgrade target does not match policy {policy_id} (version {version:?})")]
    UpgradeTargetMismatch { policy_id: String, version: Option<u32> },

    // ── Signing ──────────────────────────────────────────────────────────────
    #[error("signature failed verification")]
    SignatureInvalid,

    #[error("unknown signer kid: {0}")]
    SignerUnknown(String),

    #[error("signing operation failed: {0}")]
    SigningFailure(String),

    #[error("KMS is required (REQUIRE_KMS=true) but unreachable: {0}")]
    KmsUnreachable(String),

    // ── Audit chain ──────────────────────────────────────────────────────────
    #[error("audit chain broken at event {at}")]
    ChainBroken { at: String },

    // ── Generic ──────────────────────────────────────────────────────────────
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl WardenError {
    /// Stable dotted error code for wire responses (`{ok:false, error:{code,...}}`).
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::Unauthenticated => "UNAUTHENTICATED",
            WardenError::Forbidden => "FORBIDDEN",
            WardenError::ValidationError(_) => "VALIDATION_ERROR",
            WardenError::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            WardenError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            WardenError::LedgerImbalance { .. } => "LEDGER_IMBALANCE",
            WardenError::EmptyJournal(_) => "LEDGER_IMBALANCE",
            WardenError::ZeroAmount => "VALIDATION_ERROR",
            WardenError::DuplicateJournal(_) => "CONFLICT",
            WardenError::JournalNotFound(_) => "NOT_FOUND",
            WardenError::UpgradeRequired => "UPGRADE_REQUIRED",
            WardenError::QuorumNotReached { .. } => "QUORUM_NOT_REACHED",
            WardenError::PolicyNotFound(_) => "NOT_FOUND",
            WardenError::PolicyVersionConflict { .. } => "CONFLICT",
            WardenError::InvalidPolicyTransition { .. } => "VALIDATION_ERROR",
            WardenError::UpgradeNotFound(_) => "NOT_FOUND",
            WardenError::InvalidUpgradeTransition { .. } => "VALIDATION_ERROR",
            WardenError::ApproverNotInPool(_) => "VALIDATION_ERROR",
            WardenError::DuplicateApproval(_) => "CONFLICT",
            WardenError::ApprovalExpired(_) => "VALIDATION_ERROR",
            WardenError::UpgradeTargetMismatch { .. } => "UPGRADE_REQUIRED",
            WardenError::SignatureInvalid => "SIGNATURE_INVALID",
            WardenError::SignerUnknown(_) => "SIGNER_UNKNOWN",
            WardenError::SigningFailure(_) => "SIGNING_FAILURE",
            WardenError::KmsUnreachable(_) => "SIGNING_FAILURE",
            WardenError::ChainBroken { .. } => "CHAIN_BROKEN",
            WardenError::Conflict(_) => "CONFLICT",
            WardenError::NotFound(_) => "NOT_FOUND",
            WardenError::Serialization(_) => "INTERNAL",
            WardenError::Storage(_) => "INTERNAL",
            WardenError::Internal(_) => "INTERNAL",
            WardenError::Other(_) => "INTERNAL",
        }
    }

    /// Conventional HTTP status an adapter would map this to (documented in
    /// spec.md §6/§7; this core has no transport, so the mapping lives here
    /// as a pure function adapters can call).
    pub fn http_status(&self) -> u16 {
        match self {
            WardenError::Unauthenticated => 401,
            WardenError::Forbidden => 403,
            WardenError::ValidationError(_)
            | WardenError::ZeroAmount
            | WardenError::EmptyJournal(_)
            | WardenError::InvalidPolicyTransition { .. }
            | WardenError::InvalidUpgradeTransition { .. }
            | WardenError::ApproverNotInPool(_)
            | WardenError::ApprovalExpired(_)
            | WardenError::LedgerImbalance { .. } => 400,
            WardenError::IdempotencyConflict
            | WardenError::DuplicateJournal(_)
            | WardenError::PolicyVersionConflict { .. }
            | WardenError::DuplicateApproval(_)
            | WardenError::Conflict(_)
            | WardenError::UpgradeRequired
            | WardenError::QuorumNotReached { .. }
            | WardenError::UpgradeTargetMismatch { .. } => 409,
            WardenError::PayloadTooLarge { .. } => 413,
            WardenError::PolicyNotFound(_)
            | WardenError::UpgradeNotFound(_)
            | WardenError::JournalNotFound(_)
            | WardenError::NotFound(_) => 404,
            WardenError::SignatureInvalid => 400,
            WardenError::SignerUnknown(_) => 500,
            WardenError::SigningFailure(_) | WardenError::KmsUnreachable(_) => 500,
            WardenError::ChainBroken { .. } => 500,
            WardenError::Serialization(_) | WardenError::Storage(_) | WardenError::Internal(_) | WardenError::Other(_) => 500,
        }
    }
}
