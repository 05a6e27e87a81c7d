//! The Signing Service (C1): canonical-payload signing against a local
//! ephemeral Ed25519 fallback or a remote KMS/HSM proxy, plus a signer
//! registry for verification (Ed25519 primary, RSA-PKCS#1-v1.5/SHA-256
//! accepted for legacy proofs).

pub mod error;
pub mod keypair;
pub mod kms_client;
pub mod registry;
pub mod rsa_verify;
pub mod signer;

pub use error::SigningError;
pub use kms_client::{ClientTlsConfig, KmsClient};
pub use registry::SignerRegistry;
pub use signer::{SignResult, SigningService};
