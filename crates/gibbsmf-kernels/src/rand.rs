//! Scalar sampling primitives and deterministic seed mixing.
//!
//! Uses `scirs2_core::random` for RNG (never `rand`/`rand_distr` directly).
//! Every parallel worker in the engine derives its own `StdRng` through
//! [`mix_seed`], so a fixed base seed reproduces the same trajectory at any
//! thread count.

use scirs2_core::random::{Distribution, RandNormal as Normal, Rng};

use crate::error::{KernelError, KernelResult};

/// Mix a base seed with an arbitrary number of stream identifiers
/// (iteration, mode, row, ...) into an independent substream seed.
///
/// Splitmix64 finalization per component; cheap, stateless, and collision
/// resistant enough for seeding purposes.
pub fn mix_seed(base: u64, streams: &[u64]) -> u64 {
    let mut z = base;
    for &s in streams {
        z = z.wrapping_add(0x9e37_79b9_7f4a_7c15).wrapping_add(s);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
    }
    z
}

/// One standard-normal draw.
#[inline]
pub fn sample_standard_normal<R: Rng>(rng: &mut R) -> f64 {
    Normal::new(0.0, 1.0).unwrap().sample(rng)
}

/// Fill a slice with standard-normal draws.
pub fn fill_standard_normal<R: Rng>(rng: &mut R, out: &mut [f64]) {
    let normal = Normal::new(0.0, 1.0).unwrap();
    for x in out.iter_mut() {
        *x = normal.sample(rng);
    }
}

/// Draw from Gamma(shape, scale) with the Marsaglia–Tsang method.
///
/// Shapes below one are boosted via `Gamma(shape + 1) · U^(1/shape)`.
pub fn sample_gamma<R: Rng>(rng: &mut R, shape: f64, scale: f64) -> KernelResult<f64> {
    if shape <= 0.0 || scale <= 0.0 {
        return Err(KernelError::InvalidParameter(format!(
            "gamma requires positive shape and scale, got shape={shape}, scale={scale}"
        )));
    }
    if shape < 1.0 {
        let boosted = sample_gamma(rng, shape + 1.0, scale)?;
        let u: f64 = rng.random();
        return Ok(boosted * u.powf(1.0 / shape));
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = sample_standard_normal(rng);
        let v = 1.0 + c * x;
        if v <= 0.0 {
            continue;
        }
        let v = v * v * v;
        let u: f64 = rng.random();
        if u < 1.0 - 0.0331 * x.powi(4) {
            return Ok(d * v * scale);
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return Ok(d * v * scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::random::{rngs::StdRng, SeedableRng};

    #[test]
    fn mix_seed_is_deterministic_and_sensitive() {
        let a = mix_seed(42, &[1, 2, 3]);
        let b = mix_seed(42, &[1, 2, 3]);
        let c = mix_seed(42, &[1, 2, 4]);
        let d = mix_seed(43, &[1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn gamma_moments() {
        // mean k*theta, variance k*theta^2
        let mut rng = StdRng::seed_from_u64(1234);
        let (k, theta) = (3.0, 2.0);
        let n = 100_000;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for i in 0..n {
            let x = sample_gamma(&mut rng, k, theta).unwrap();
            let delta = x - mean;
            mean += delta / (i + 1) as f64;
            m2 += delta * (x - mean);
        }
        let var = m2 / (n - 1) as f64;
        assert!((mean - 6.0).abs() < 0.1, "mean {mean}");
        assert!((var - 12.0).abs() < 0.5, "var {var}");
    }

    #[test]
    fn gamma_small_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 50_000;
        let mean: f64 = (0..n)
            .map(|_| sample_gamma(&mut rng, 0.5, 1.0).unwrap())
            .sum::<f64>()
            / n as f64;
        assert!((mean - 0.5).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn gamma_rejects_bad_parameters() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample_gamma(&mut rng, 0.0, 1.0).is_err());
        assert!(sample_gamma(&mut rng, 1.0, -1.0).is_err());
    }

    proptest::proptest! {
        #[test]
        fn gamma_draws_are_positive_and_finite(
            shape in 0.05f64..20.0,
            scale in 0.05f64..10.0,
            seed: u64,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let x = sample_gamma(&mut rng, shape, scale).unwrap();
            proptest::prop_assert!(x > 0.0 && x.is_finite());
        }

        #[test]
        fn distinct_row_streams_never_collide(
            base: u64,
            iter in 0u64..1000,
            a in 0u64..100_000,
            b in 0u64..100_000,
        ) {
            proptest::prop_assume!(a != b);
            proptest::prop_assert_ne!(
                mix_seed(base, &[iter, 0, a]),
                mix_seed(base, &[iter, 0, b])
            );
        }
    }
}
