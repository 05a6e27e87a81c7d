use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Core(#[from] WardenError),

    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),

    #[error(transparent)]
    Signing(#[from] warden_crypto::SigningError),

    #[error("canonicalization failed: {0}")]
    Canonicalize(#[from] serde_json::Error),
}

impl From<LedgerError> for WardenError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Core(inner) => inner,
            LedgerError::Audit(inner) => inner.into(),
            LedgerError::Signing(inner) => inner.into(),
            LedgerError::Canonicalize(inner) => WardenError::Serialization(inner.to_string()),
        }
    }
}
