//! The Audit Chain (C2): an append-only, hash-linked, per-shard event log.
//! Every mutating operation elsewhere in the workspace appends one event
//! here instead of being trusted on its own say-so.

pub mod chain;
pub mod error;

pub use chain::{AuditChain, PreparedAppend};
pub use error::AuditError;
