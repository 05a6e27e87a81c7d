//! ─── Warden protocol constants ──────────────────────────────────────────────
//!
//! Defaults for the multi-sig, idempotency, and canary subsystems. Every
//! value here is a *default* — deployments override via the environment
//! contract in spec.md §6 (see `warden-node::config`).

// ── Multi-sig upgrade workflow ────────────────────────────────────────────────

/// Default N in N-of-M quorum.
pub const DEFAULT_REQUIRED_APPROVALS: u32 = 3;

/// Default size of the approver pool (M).
pub const DEFAULT_APPROVER_POOL_SIZE: usize = 5;

/// Approval TTL: an approval submitted more than this long ago no longer
/// counts toward quorum.
pub const APPROVAL_TTL_DAYS: i64 = 14;

/// Break-glass ratification window: an `emergency_applied` upgrade must
/// collect N approvals within this window or an automatic rollback fires.
pub const EMERGENCY_RATIFICATION_HOURS: i64 = 48;

// ── Idempotency ───────────────────────────────────────────────────────────────

/// Default idempotency record expiry.
pub const IDEMPOTENCY_DEFAULT_EXPIRY_HOURS: i64 = 24;

/// Default max stored response body size (1 MiB).
pub const IDEMPOTENCY_DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

// ── Canary / policy evaluator ─────────────────────────────────────────────────

/// Sliding window size for canary auto-rollback sampling.
pub const CANARY_WINDOW_SIZE: usize = 50;

/// Non-allow enforcement fraction, out of the window, that triggers rollback.
pub const CANARY_FAILURE_RATE_THRESHOLD: f64 = 0.5;

/// Minimum seconds between successive auto-rollbacks of the same policy.
pub const CANARY_ROLLBACK_COOLDOWN_SECS: i64 = 300;

/// Active-policy cache TTL for the evaluator.
pub const POLICY_CACHE_TTL_SECS: u64 = 5;

// ── Signing / KMS ─────────────────────────────────────────────────────────────

/// Max signing attempts (1 initial + up to this many retries).
pub const KMS_MAX_ATTEMPTS: u32 = 2;

/// Initial backoff before the first retry.
pub const KMS_INITIAL_BACKOFF_MS: u64 = 100;
