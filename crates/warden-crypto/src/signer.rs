use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use warden_core::signer::{SignerAlgorithm, SignerRecord};

use crate::error::SigningError;
use crate::keypair::Ed25519KeyPair;
use crate::kms_client::KmsClient;
use crate::registry::SignerRegistry;

/// Result of a `sign` call (spec §4.1 contract).
pub struct SignResult {
    pub signature_b64: String,
    pub signer_kid: String,
}

/// `local-ed25519:<first-16-hex-of-sha256(pubkey)>` (spec §4.1).
fn local_kid(public_key: &[u8]) -> String {
    let digest = warden_core::hash::sha256_hex(public_key);
    format!("local-ed25519:{}", &digest[..16])
}

/// The two backends the Signing Service can use. Selected once at startup
/// from configuration — never swapped at request time (spec §9, "pooled
/// client" note: construct explicitly, inject, no hidden singleton).
pub enum SigningService {
    /// Ephemeral dev/local signer. Construction itself refuses to happen
    /// under `REQUIRE_KMS=true`; see `SigningService::local`.
    Local {
        keypair: Ed25519KeyPair,
        kid: String,
    },
    /// Remote KMS/HSM-backed signer.
    Kms { client: KmsClient, kid: String },
}

impl SigningService {
    /// Build the local ephemeral fallback. Fails if `require_kms` is set —
    /// production must not silently fall back (spec §4.1).
    pub fn local(seed: [u8; 32], require_kms: bool) -> Result<Self, SigningError> {
        if require_kms {
            return Err(SigningError::FallbackNotPermitted);
        }
        let keypair = Ed25519KeyPair::from_seed(seed);
        let kid = local_kid(&keypair.public_key_bytes());
        Ok(SigningService::Local { keypair, kid })
    }

    pub fn kms(client: KmsClient, kid: String) -> Self {
        SigningService::Kms { client, kid }
    }

    pub fn kid(&self) -> &str {
        match self {
            SigningService::Local { kid, .. } => kid,
            SigningService::Kms { kid, .. } => kid,
        }
    }

    /// Register this service's own signer with a registry so `verify` calls
    /// elsewhere can validate events it produced (including after a local
    /// keypair is generated fresh at dev startup).
    pub fn register_self(&self, registry: &SignerRegistry) {
        if let SigningService::Local { keypair, kid } = self {
            registry.register(SignerRecord {
                kid: kid.clone(),
                algorithm: SignerAlgorithm::Ed25519,
                public_key: keypair.public_key_bytes().to_vec(),
                deployed_at: Utc::now(),
                description: "ephemeral local Ed25519 dev signer".to_string(),
            });
        }
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<SignResult, SigningError> {
        match self {
            SigningService::Local { keypair, kid } => {
                let sig = keypair.sign(payload);
                let signature_b64 = base64::engine::general_purpose::STANDARD.encode(sig);
                Ok(SignResult {
                    signature_b64,
                    signer_kid: kid.clone(),
                })
            }
            SigningService::Kms { client, .. } => {
                let (signature_b64, signer_kid) = client.sign(payload).await?;
                Ok(SignResult {
                    signature_b64,
                    signer_kid,
                })
            }
        }
    }
}

/// Verify a signature against the shared registry, dispatching by the
/// signer's declared algorithm. This is independent of which backend is
/// currently configured for *signing* — verification must succeed for any
/// KID ever recorded in the registry, including rotated-out keys (spec §3
/// Signer: "old KIDs remain in the registry for verification of historical
/// events").
pub fn verify(
    registry: &Arc<SignerRegistry>,
    payload: &[u8],
    signature_b64: &str,
    signer_kid: &str,
) -> Result<(), SigningError> {
    let sig = base64::engine::general_purpose::STANDARD
        .decode(signature_b64)
        .map_err(|_| SigningError::InvalidSignature)?;
    registry.verify(signer_kid, payload, &sig)
}
