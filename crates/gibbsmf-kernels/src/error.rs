//! Error types for the sampling kernels.

use thiserror::Error;

/// Numerical failures inside a sampling kernel. These indicate a diverged or
/// ill-posed posterior and are fatal for the enclosing run: a corrupt draw
/// would propagate through every later Gibbs sweep.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Cholesky factorization failed, matrix is not positive definite: {detail}")]
    NotPositiveDefinite { detail: String },

    #[error("invalid distribution parameter: {0}")]
    InvalidParameter(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Result alias for this crate.
pub type KernelResult<T> = Result<T, KernelError>;
