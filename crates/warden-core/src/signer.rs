use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Signer algorithm is per-signer metadata, never hardcoded by the verifier
/// (spec §9 open question): Ed25519 is primary, RSA-PKCS#1-v1.5/SHA-256 is
/// accepted for legacy proofs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerAlgorithm {
    Ed25519,
    RsaPkcs1v15Sha256,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignerRecord {
    pub kid: String,
    pub algorithm: SignerAlgorithm,
    /// Raw public key bytes (SPKI DER for RSA, 32-byte point for Ed25519).
    pub public_key: Vec<u8>,
    pub deployed_at: Timestamp,
    pub description: String,
}
