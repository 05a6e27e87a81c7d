use thiserror::Error;
use warden_core::WardenError;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unknown signer kid: {0}")]
    UnknownSigner(String),

    #[error("KMS request failed after retries: {0}")]
    KmsRequestFailed(String),

    #[error("KMS endpoint not configured and fallback is not permitted (REQUIRE_KMS=true)")]
    FallbackNotPermitted,

    #[error("mTLS client identity could not be built: {0}")]
    TlsIdentity(String),
}

impl From<SigningError> for WardenError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::InvalidSignature | SigningError::InvalidPublicKey => {
                WardenError::SignatureInvalid
            }
            SigningError::UnknownSigner(kid) => WardenError::SignerUnknown(kid),
            SigningError::KmsRequestFailed(msg) => WardenError::SigningFailure(msg),
            SigningError::FallbackNotPermitted => {
                WardenError::KmsUnreachable("no endpoint configured".to_string())
            }
            SigningError::TlsIdentity(msg) => WardenError::SigningFailure(msg),
        }
    }
}
