use std::collections::HashMap;
use std::sync::RwLock;

use warden_core::signer::{SignerAlgorithm, SignerRecord};

use crate::error::SigningError;
use crate::{keypair, rsa_verify};

/// In-memory signer registry: KID → public key material. Signer public
/// keys are cached indefinitely and reloaded only on an explicit refresh
/// (spec §5) — there is no TTL here, unlike the policy cache.
pub struct SignerRegistry {
    signers: RwLock<HashMap<String, SignerRecord>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self {
            signers: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_records(records: Vec<SignerRecord>) -> Self {
        let reg = Self::new();
        for r in records {
            reg.register(r);
        }
        reg
    }

    pub fn register(&self, record: SignerRecord) {
        self.signers
            .write()
            .expect("signer registry lock poisoned")
            .insert(record.kid.clone(), record);
    }

    pub fn get(&self, kid: &str) -> Option<SignerRecord> {
        self.signers
            .read()
            .expect("signer registry lock poisoned")
            .get(kid)
            .cloned()
    }

    /// Replace the whole registry contents (used on a configured registry
    /// change — spec §5).
    pub fn reload(&self, records: Vec<SignerRecord>) {
        let mut map = self.signers.write().expect("signer registry lock poisoned");
        map.clear();
        for r in records {
            map.insert(r.kid.clone(), r);
        }
    }

    /// Verify `signature` over `message` was produced by `kid`, dispatching
    /// on that signer's declared algorithm (never hardcoded — spec §9).
    pub fn verify(&self, kid: &str, message: &[u8], signature: &[u8]) -> Result<(), SigningError> {
        let record = self
            .get(kid)
            .ok_or_else(|| SigningError::UnknownSigner(kid.to_string()))?;
        match record.algorithm {
            SignerAlgorithm::Ed25519 => {
                keypair::verify_ed25519(&record.public_key, message, signature)
            }
            SignerAlgorithm::RsaPkcs1v15Sha256 => {
                rsa_verify::verify_rsa_pkcs1v15_sha256(&record.public_key, message, signature)
            }
        }
    }
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
