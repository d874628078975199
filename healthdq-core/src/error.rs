// healthdq-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QualityError {
    // --- DOMAIN (rules, ledger, decisions) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE (IO, parsing, DuckDB) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl QualityError {
    /// Fatal errors abort the run; per-field errors are surfaced as issues instead.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Domain(e) => e.is_fatal(),
            Self::Infrastructure(_) | Self::Internal(_) => true,
        }
    }
}

impl From<std::io::Error> for QualityError {
    fn from(err: std::io::Error) -> Self {
        QualityError::Infrastructure(InfrastructureError::Io(err))
    }
}
