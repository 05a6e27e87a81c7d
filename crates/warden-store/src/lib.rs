//! `sled`-backed persistence for every table named in the persisted state
//! layout: audit events, idempotency records, policies, upgrades and their
//! approvals, ledger journals and proofs, and the signer registry.
//!
//! Thin accessor methods only — no business logic, no validation beyond
//! what the storage encoding itself requires. Callers (`warden-audit`,
//! `warden-sentinel`, `warden-upgrade`, `warden-ledger`) own the invariants.

pub mod db;

pub use db::StateDb;
