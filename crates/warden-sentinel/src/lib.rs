//! Policy & Multi-sig Core, evaluator half (C4.1/C4.2): a versioned policy
//! store, the `evaluateAction` decision pipeline, canary sampling and
//! auto-rollback. The N-of-M upgrade workflow itself lives in
//! `warden-upgrade`, which depends on this crate to apply the policy side
//! effect once quorum is reached.

pub mod canary;
pub mod engine;
pub mod metrics;
pub mod rule;

pub use engine::{PolicyEngine, PolicyFilter};
pub use metrics::Counters;
