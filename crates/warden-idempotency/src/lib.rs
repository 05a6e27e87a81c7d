//! The Idempotency Layer (C3): at-most-once effects and replayable
//! responses for any mutating request carrying an idempotency key.

pub mod store;

pub use store::{IdempotencyConfig, IdempotencyStore, Outcome, Guard};
