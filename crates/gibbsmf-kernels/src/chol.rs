//! Cholesky factorization, triangular solves, and the conjugate-Gaussian
//! posterior draw built on them.
//!
//! The per-row conditional of a latent vector is `Normal(Q⁻¹r, Q⁻¹)` for a
//! precision matrix `Q` and linear term `r`. Drawing from it never forms
//! `Q⁻¹`: factor `Q = L·Lᵀ`, solve `L·y = r`, add a standard-normal vector,
//! solve `Lᵀ·x = y`.

use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_core::random::Rng;

use crate::error::{KernelError, KernelResult};
use crate::rand::fill_standard_normal;

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
///
/// A factorization failure means the accumulated precision is not positive
/// definite, i.e. the sampler has diverged. Callers treat this as fatal.
pub fn cholesky(a: &Array2<f64>) -> KernelResult<Array2<f64>> {
    scirs2_linalg::cholesky(&a.view(), None).map_err(|e| KernelError::NotPositiveDefinite {
        detail: e.to_string(),
    })
}

/// Solve `L·y = b` in place for lower-triangular `L`.
pub fn forward_substitute(l: &Array2<f64>, b: &mut Array1<f64>) {
    let n = b.len();
    for i in 0..n {
        let mut acc = b[i];
        for j in 0..i {
            acc -= l[[i, j]] * b[j];
        }
        b[i] = acc / l[[i, i]];
    }
}

/// Solve `Lᵀ·x = b` in place for lower-triangular `L`.
pub fn back_substitute(l: &Array2<f64>, b: &mut Array1<f64>) {
    let n = b.len();
    for i in (0..n).rev() {
        let mut acc = b[i];
        for j in (i + 1)..n {
            acc -= l[[j, i]] * b[j];
        }
        b[i] = acc / l[[i, i]];
    }
}

/// Draw `x ~ Normal(Q⁻¹·r, Q⁻¹)` for precision `Q` and linear term `r`.
pub fn sample_gaussian_posterior<R: Rng>(
    rng: &mut R,
    q: &Array2<f64>,
    r: &Array1<f64>,
) -> KernelResult<Array1<f64>> {
    if q.nrows() != q.ncols() || q.nrows() != r.len() {
        return Err(KernelError::DimensionMismatch(format!(
            "precision is {}x{} but linear term has length {}",
            q.nrows(),
            q.ncols(),
            r.len()
        )));
    }
    let l = cholesky(q)?;
    let mut x = r.clone();
    forward_substitute(&l, &mut x);
    let mut z = Array1::<f64>::zeros(r.len());
    fill_standard_normal(rng, z.as_slice_mut().expect("contiguous"));
    x += &z;
    back_substitute(&l, &mut x);
    Ok(x)
}

/// Inverse of a symmetric positive-definite matrix through its Cholesky
/// factor: solve against every unit vector, then symmetrize.
pub fn cholesky_inverse(a: &Array2<f64>) -> KernelResult<Array2<f64>> {
    let n = a.nrows();
    let l = cholesky(a)?;
    let mut inv = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut col = Array1::<f64>::zeros(n);
        col[j] = 1.0;
        forward_substitute(&l, &mut col);
        back_substitute(&l, &mut col);
        inv.column_mut(j).assign(&col);
    }
    // enforce exact symmetry against solve round-off
    for i in 0..n {
        for j in (i + 1)..n {
            let s = 0.5 * (inv[[i, j]] + inv[[j, i]]);
            inv[[i, j]] = s;
            inv[[j, i]] = s;
        }
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;
    use scirs2_core::random::{rngs::StdRng, SeedableRng};

    fn spd_fixture() -> Array2<f64> {
        array![[4.0, 2.0, 0.4], [2.0, 3.0, 0.2], [0.4, 0.2, 1.5]]
    }

    #[test]
    fn triangular_solves_invert_the_factor() {
        let a = spd_fixture();
        let l = cholesky(&a).unwrap();
        let b = array![1.0, -2.0, 0.5];
        let mut x = b.clone();
        forward_substitute(&l, &mut x);
        back_substitute(&l, &mut x);
        // check A x = b
        let ax = a.dot(&x);
        for (lhs, rhs) in ax.iter().zip(b.iter()) {
            assert!((lhs - rhs).abs() < 1e-10);
        }
    }

    #[test]
    fn inverse_matches_identity() {
        let a = spd_fixture();
        let inv = cholesky_inverse(&a).unwrap();
        let prod = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod[[i, j]] - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn posterior_draw_has_expected_moments() {
        // Q = 4 I, r = 4·1 => mean 1, variance 0.25 per component
        let q = Array2::<f64>::eye(2) * 4.0;
        let r = array![4.0, 4.0];
        let mut rng = StdRng::seed_from_u64(99);
        let n = 50_000;
        let mut mean = [0.0f64; 2];
        let mut m2 = [0.0f64; 2];
        for i in 0..n {
            let x = sample_gaussian_posterior(&mut rng, &q, &r).unwrap();
            for d in 0..2 {
                let delta = x[d] - mean[d];
                mean[d] += delta / (i + 1) as f64;
                m2[d] += delta * (x[d] - mean[d]);
            }
        }
        for d in 0..2 {
            assert!((mean[d] - 1.0).abs() < 0.02, "mean {}", mean[d]);
            let var = m2[d] / (n - 1) as f64;
            assert!((var - 0.25).abs() < 0.02, "var {var}");
        }
    }

    #[test]
    fn non_positive_definite_is_an_error() {
        let a = array![[1.0, 2.0], [2.0, 1.0]]; // eigenvalues 3, -1
        assert!(matches!(
            cholesky(&a),
            Err(KernelError::NotPositiveDefinite { .. })
        ));
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let q = Array2::<f64>::eye(3);
        let r = array![1.0, 2.0];
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sample_gaussian_posterior(&mut rng, &q, &r),
            Err(KernelError::DimensionMismatch(_))
        ));
    }
}
