//! Error types shared by the object-condensation crates.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcError {
    /// Paired inputs disagree on length or a derived count does not match.
    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("beta stabilizing mode '{0}' is not known (expected paper, clip or soft_q_scaling)")]
    UnknownStabilizingMode(String),

    /// An internal consistency check failed; the caller violated a documented invariant.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// NaN/Inf survived sanitization.
    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OcResult<T> = Result<T, OcError>;

/// Fails with [`OcError::ShapeMismatch`] unless `got == expected`.
#[inline]
pub fn ensure_len(what: &'static str, expected: usize, got: usize) -> OcResult<()> {
    if expected != got {
        return Err(OcError::ShapeMismatch { what, expected, got });
    }
    Ok(())
}
