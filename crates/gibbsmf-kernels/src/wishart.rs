//! Wishart and conditional Normal-Wishart sampling.
//!
//! These drive the once-per-sweep hyperparameter updates: given the sufficient
//! statistics of a factor matrix (column sum and scatter), the conjugate
//! posterior of its Gaussian prior's `(μ, Λ)` is Normal-Wishart, and
//! [`cond_normal_wishart`] draws from it in closed form.

use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_core::random::Rng;

use crate::chol::{back_substitute, cholesky, cholesky_inverse};
use crate::error::{KernelError, KernelResult};
use crate::rand::{fill_standard_normal, sample_gamma, sample_standard_normal};

/// Diagonal jitter applied before inverting the posterior scale, matching the
/// regularization customary for near-singular scatter matrices.
const SCATTER_JITTER: f64 = 1e-7;

/// Draw from Wishart(scale, df) via the Bartlett construction.
///
/// `df` must be at least the dimension. The draw is `L·A·Aᵀ·Lᵀ` where `L` is
/// the Cholesky factor of the scale and `A` is triangular with chi
/// distributed diagonal and standard-normal off-diagonal entries.
pub fn sample_wishart<R: Rng>(
    rng: &mut R,
    scale: &Array2<f64>,
    df: f64,
) -> KernelResult<Array2<f64>> {
    let m = scale.nrows();
    if scale.ncols() != m {
        return Err(KernelError::DimensionMismatch(format!(
            "Wishart scale must be square, got {}x{}",
            m,
            scale.ncols()
        )));
    }
    if df < m as f64 {
        return Err(KernelError::InvalidParameter(format!(
            "Wishart needs df >= dimension, got df={df} for dimension {m}"
        )));
    }

    // upper-triangular Bartlett factor of a unit Wishart
    let mut c = Array2::<f64>::zeros((m, m));
    for i in 0..m {
        let g = sample_gamma(rng, 0.5 * (df - i as f64), 1.0)?;
        c[[i, i]] = (2.0 * g).sqrt();
        for j in (i + 1)..m {
            c[[i, j]] = sample_standard_normal(rng);
        }
    }
    let unit = c.t().dot(&c);

    let l = cholesky(scale)?;
    Ok(l.dot(&unit).dot(&l.t()))
}

/// Draw `(μ, Λ)` from NormalWishart(μ₀, κ, scale, df):
/// `Λ ~ Wishart(scale, df)` then `μ ~ Normal(μ₀, (κ·Λ)⁻¹)`.
pub fn sample_normal_wishart<R: Rng>(
    rng: &mut R,
    mu0: &Array1<f64>,
    kappa: f64,
    scale: &Array2<f64>,
    df: f64,
) -> KernelResult<(Array1<f64>, Array2<f64>)> {
    let lambda = sample_wishart(rng, scale, df)?;
    let prec = &lambda * kappa;
    let l = cholesky(&prec)?;
    let mut mu = Array1::<f64>::zeros(mu0.len());
    fill_standard_normal(rng, mu.as_slice_mut().expect("contiguous"));
    back_substitute(&l, &mut mu);
    mu += mu0;
    Ok((mu, lambda))
}

/// Draw from the conditional Normal-Wishart posterior given `n` observed
/// latent vectors with scatter `Σ uᵢuᵢᵀ` and sum `Σ uᵢ`, under the prior
/// NormalWishart(μ₀, κ₀, t0_inv⁻¹, df₀), where `t0_inv` is the *inverse*
/// prior scale (identity in practice).
#[allow(clippy::too_many_arguments)]
pub fn cond_normal_wishart<R: Rng>(
    rng: &mut R,
    n: usize,
    scatter: &Array2<f64>,
    sum: &Array1<f64>,
    mu0: &Array1<f64>,
    kappa0: f64,
    t0_inv: &Array2<f64>,
    df0: f64,
) -> KernelResult<(Array1<f64>, Array2<f64>)> {
    let k = mu0.len();
    if scatter.nrows() != k || scatter.ncols() != k || sum.len() != k {
        return Err(KernelError::DimensionMismatch(format!(
            "sufficient statistics do not match dimension {k}"
        )));
    }

    let nf = n as f64;
    let kappa_c = kappa0 + nf;
    let df_c = df0 + nf;
    let mu_c = (mu0 * kappa0 + sum) / kappa_c;

    // inverse posterior scale
    let mut x = t0_inv + scatter;
    for i in 0..k {
        for j in 0..k {
            x[[i, j]] += kappa0 * mu0[i] * mu0[j] - kappa_c * mu_c[i] * mu_c[j];
        }
        x[[i, i]] += SCATTER_JITTER;
    }
    let scale_c = cholesky_inverse(&x)?;

    sample_normal_wishart(rng, &mu_c, kappa_c, &scale_c, df_c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;
    use scirs2_core::random::{rngs::StdRng, SeedableRng};

    #[test]
    fn wishart_mean_is_df_times_scale() {
        let scale = array![[0.5, 0.1], [0.1, 0.3]];
        let df = 5.0;
        let mut rng = StdRng::seed_from_u64(17);
        let n = 20_000;
        let mut acc = Array2::<f64>::zeros((2, 2));
        for _ in 0..n {
            acc += &sample_wishart(&mut rng, &scale, df).unwrap();
        }
        acc /= n as f64;
        for i in 0..2 {
            for j in 0..2 {
                let expected = df * scale[[i, j]];
                assert!(
                    (acc[[i, j]] - expected).abs() < 0.05,
                    "E[W][{i},{j}] = {} vs {expected}",
                    acc[[i, j]]
                );
            }
        }
    }

    #[test]
    fn wishart_rejects_low_df() {
        let mut rng = StdRng::seed_from_u64(0);
        let scale = Array2::<f64>::eye(3);
        assert!(sample_wishart(&mut rng, &scale, 2.0).is_err());
    }

    #[test]
    fn posterior_concentrates_on_the_data() {
        // 20k unit-variance samples around (1, -2): the posterior mean draw
        // must land near the sample mean and the precision near identity.
        let mut rng = StdRng::seed_from_u64(123);
        let k = 2;
        let n = 20_000;
        let mut sum = Array1::<f64>::zeros(k);
        let mut scatter = Array2::<f64>::zeros((k, k));
        let truth = [1.0, -2.0];
        for _ in 0..n {
            let u = array![
                truth[0] + sample_standard_normal(&mut rng),
                truth[1] + sample_standard_normal(&mut rng)
            ];
            sum += &u;
            for i in 0..k {
                for j in 0..k {
                    scatter[[i, j]] += u[i] * u[j];
                }
            }
        }

        let mu0 = Array1::<f64>::zeros(k);
        let t0_inv = Array2::<f64>::eye(k);
        let (mu, lambda) =
            cond_normal_wishart(&mut rng, n, &scatter, &sum, &mu0, 2.0, &t0_inv, k as f64)
                .unwrap();

        for d in 0..k {
            assert!((mu[d] - truth[d]).abs() < 0.1, "mu[{d}] = {}", mu[d]);
        }
        for i in 0..k {
            for j in 0..k {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (lambda[[i, j]] - expected).abs() < 0.1,
                    "Lambda[{i},{j}] = {}",
                    lambda[[i, j]]
                );
            }
        }
        // precision draw must be symmetric positive definite
        assert!(cholesky(&lambda).is_ok());
    }
}
