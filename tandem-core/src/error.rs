//! Engine error type.

use thiserror::Error;

/// Errors surfaced by the dense solver engine.
///
/// Numeric non-convergence is never an error; it is reported through the
/// `converged` flag of [`crate::solver::AdmmInfo`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The problem dimensions are unusable (empty matrix, zero-size block).
    #[error("invalid problem dimensions: {0}")]
    InvalidDimensions(String),

    /// A caller-supplied buffer or term slice has the wrong length.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Cholesky factorization of the projection gram matrix failed.
    #[error("factorization failed: {0}")]
    Factorization(String),

    /// Non-finite values invalidated the computation.
    #[error("numerical failure: {0}")]
    Numerical(String),
}
