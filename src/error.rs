/**
 * Error Types
 * Typed failures surfaced by every template/authentication operation
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NeuroLockError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Degenerate vector: L2 norm below {epsilon}")]
    DegenerateVector { epsilon: f64 },

    #[error("Entropy source unavailable")]
    EntropyUnavailable,

    #[error("Digest computation failed: {0}")]
    CryptoFailure(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("No template found for '{0}'")]
    NotFound(String),

    #[error("Template already exists for '{0}'")]
    AlreadyExists(String),

    #[error("Corrupt template record: {0}")]
    CorruptRecord(String),

    #[error("Allocation of {requested} elements failed")]
    AllocationFailure { requested: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NeuroLockError>;

impl NeuroLockError {
    /// True when the operation could not be evaluated at all, as opposed to a
    /// caller-side mistake such as a duplicate enrolment or unknown user.
    pub fn is_processing_failure(&self) -> bool {
        !matches!(
            self,
            NeuroLockError::NotFound(_) | NeuroLockError::AlreadyExists(_)
        )
    }
}

/// Reserve exactly `len` slots, reporting exhaustion instead of aborting.
pub(crate) fn try_with_capacity<T>(len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| NeuroLockError::AllocationFailure { requested: len })?;
    Ok(buf)
}
