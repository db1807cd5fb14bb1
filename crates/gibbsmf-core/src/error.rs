//! Error types for observation storage.

use thiserror::Error;

/// Errors raised while constructing or reorienting observation storage.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("shape cannot be empty or contain zero-size modes: {shape:?}")]
    InvalidShape { shape: Vec<usize> },

    #[error("coordinate arity mismatch: entry has {got} indices but tensor has {expected} modes")]
    ArityMismatch { expected: usize, got: usize },

    #[error("length mismatch: {coords} coordinates but {values} values")]
    LengthMismatch { coords: usize, values: usize },

    #[error("index out of bounds: coordinate {coord:?} exceeds shape {shape:?}")]
    IndexOutOfBounds { coord: Vec<usize>, shape: Vec<usize> },

    #[error("mode {mode} out of bounds for tensor with {nmodes} modes")]
    ModeOutOfBounds { mode: usize, nmodes: usize },
}

/// Result alias for this crate.
pub type CoreResult<T> = Result<T, CoreError>;
