//! The N-of-M multi-sig Upgrade workflow (C4.3): manifest creation,
//! approval collection against a configured approver pool, quorum-gated
//! apply, and break-glass emergency application with scheduled
//! ratification.

pub mod pool;
pub mod workflow;

pub use pool::ApproverPool;
pub use workflow::UpgradeWorkflow;
