//! # gibbsmf-core
//!
//! Observation storage for the gibbsmf Bayesian factorization engine.
//!
//! This crate provides:
//! - [`SparseTensor`]: immutable COO storage for the observed entries of a
//!   matrix or tensor
//! - [`SparseMode`]: a per-mode compressed orientation of a [`SparseTensor`]
//!   for fast iteration over one mode's rows
//! - [`partition`]: contiguous row-range partitioning for multi-worker runs
//!
//! No sampling or model logic lives here; this is the data-format leaf of the
//! gibbsmf stack.

pub mod error;
pub mod partition;
pub mod sparse;

pub use error::{CoreError, CoreResult};
pub use partition::{partition, partition_offsets};
pub use sparse::{Coord, SparseMode, SparseTensor};
