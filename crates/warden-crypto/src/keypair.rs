use ed25519_dalek::{Signer as DalekSigner, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::SigningError;

/// An ephemeral Ed25519 keypair used by the dev/local signer fallback.
///
/// The seed is held in a `Zeroizing<[u8; 32]>` so it is wiped on drop; the
/// `SigningKey` itself is reconstructed on demand rather than held live,
/// mirroring the teacher's pattern of storing raw secret bytes and
/// rebuilding the scheme object per operation (`chronx_crypto::KeyPair`).
pub struct Ed25519KeyPair {
    seed: Zeroizing<[u8; 32]>,
    public_key: VerifyingKey,
}

impl Ed25519KeyPair {
    /// Generate a fresh keypair from OS randomness.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministically derive a keypair from a 32-byte seed (e.g. the
    /// configured dev seed for the local fallback signer).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key();
        Self {
            seed: Zeroizing::new(seed),
            public_key,
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(&self.seed);
        signing_key.sign(message).to_bytes()
    }
}

/// Verify a detached Ed25519 signature against a raw 32-byte public key.
pub fn verify_ed25519(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SigningError> {
    let pk_array: [u8; 32] = public_key
        .try_into()
        .map_err(|_| SigningError::InvalidPublicKey)?;
    let sig_array: [u8; 64] = signature
        .try_into()
        .map_err(|_| SigningError::InvalidSignature)?;

    let verifying_key =
        VerifyingKey::from_bytes(&pk_array).map_err(|_| SigningError::InvalidPublicKey)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);

    use ed25519_dalek::Verifier;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| SigningError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = Ed25519KeyPair::generate();
        let msg = b"warden audit chain hash";
        let sig = kp.sign(msg);
        assert!(verify_ed25519(&kp.public_key_bytes(), msg, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let kp = Ed25519KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(verify_ed25519(&kp.public_key_bytes(), b"tampered", &sig).is_err());
    }

    #[test]
    fn seeded_keypairs_are_deterministic() {
        let a = Ed25519KeyPair::from_seed([7u8; 32]);
        let b = Ed25519KeyPair::from_seed([7u8; 32]);
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
    }
}
