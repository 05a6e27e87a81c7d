use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Core(#[from] WardenError),

    #[error(transparent)]
    Signing(#[from] warden_crypto::SigningError),

    #[error("canonicalization failed: {0}")]
    Canonicalize(#[from] serde_json::Error),
}

impl From<AuditError> for WardenError {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::Core(inner) => inner,
            AuditError::Signing(inner) => inner.into(),
            AuditError::Canonicalize(inner) => WardenError::Serialization(inner.to_string()),
        }
    }
}
