use thiserror::Error;

/// Error taxonomy for the posting engine.
///
/// Posting and reversal failures abort the enclosing store batch and
/// propagate to the calling document controller; this crate never leaves
/// a document partially applied.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(anyhow::Error),

    /// A state-guard violation: reverting a document whose postings are
    /// not live, or re-applying postings for a document that is already
    /// live. Detected and rejected instead of corrupting balances.
    #[error("Invariant violation: {0}")]
    InvariantViolation(anyhow::Error),

    /// Contention on an atomic increment or batch commit. The whole
    /// document operation is retried a bounded number of times before
    /// this surfaces to the caller.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(anyhow::Error),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(anyhow::anyhow!(msg.into()))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(anyhow::anyhow!(msg.into()))
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(anyhow::anyhow!(msg.into()))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(anyhow::anyhow!(msg.into()))
    }

    /// Label used for the error counter metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        LedgerError::Config(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                LedgerError::NotFound(anyhow::Error::new(err))
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                LedgerError::ConcurrencyConflict(anyhow::Error::new(err))
            }
            _ => LedgerError::Database(anyhow::Error::new(err)),
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Internal(anyhow::Error::new(err))
    }
}
