use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha256;

use crate::error::SigningError;

/// RSA-PKCS#1-v1.5/SHA-256 verification, accepted for legacy proof signers
/// (spec §3, Signer.algorithm). `public_key_der` is the PKCS#1 DER encoding
/// of the RSA public key.
pub fn verify_rsa_pkcs1v15_sha256(
    public_key_der: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SigningError> {
    let public_key =
        RsaPublicKey::from_pkcs1_der(public_key_der).map_err(|_| SigningError::InvalidPublicKey)?;
    let verifying_key = RsaVerifyingKey::<Sha256>::new(public_key);
    let signature =
        RsaSignature::try_from(signature).map_err(|_| SigningError::InvalidSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| SigningError::InvalidSignature)
}
