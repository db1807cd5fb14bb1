//! # gibbsmf-kernels
//!
//! Numeric sampling kernels for the gibbsmf Bayesian factorization engine:
//!
//! - deterministic seed mixing for per-row RNG substreams
//! - Gamma sampling (Marsaglia–Tsang)
//! - Cholesky factorization (via `scirs2-linalg`), triangular solves and the
//!   multivariate-normal posterior draw built on them
//! - Wishart / conditional Normal-Wishart sampling for the conjugate
//!   hyperparameter updates
//!
//! All kernels take an explicit `Rng`; nothing here owns global state. The
//! posterior matrices involved are small (`K×K` for `K` latent dimensions),
//! so the solves are plain loops over `scirs2_core` arrays.

pub mod chol;
pub mod error;
pub mod rand;
pub mod wishart;

pub use chol::{back_substitute, cholesky, cholesky_inverse, forward_substitute,
               sample_gaussian_posterior};
pub use error::{KernelError, KernelResult};
pub use rand::{fill_standard_normal, mix_seed, sample_gamma, sample_standard_normal};
pub use wishart::{cond_normal_wishart, sample_normal_wishart, sample_wishart};
