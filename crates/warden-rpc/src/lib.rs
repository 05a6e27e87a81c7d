//! The JSON-RPC surface (spec §6): one `jsonrpsee` server exposing every
//! Warden endpoint as an RPC method under the `warden_` namespace. Wire
//! parsing/formatting lives here; every core crate underneath stays
//! transport-agnostic.

pub mod api;
pub mod conv;
pub mod error;
pub mod server;
pub mod types;

pub use api::WardenApiServer;
pub use server::{RpcServer, RpcServerState};
