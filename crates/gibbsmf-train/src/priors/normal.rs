//! Shared multivariate-Normal prior with a Normal-Wishart hyperprior.

use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_core::parallel_ops::*;
use scirs2_core::random::{rngs::StdRng, SeedableRng};

use gibbsmf_kernels::{cond_normal_wishart, mix_seed, sample_gaussian_posterior};

use crate::checkpoint::{StepReader, StepWriter};
use crate::data::TrainData;
use crate::error::{TrainError, TrainResult};
use crate::model::Model;
use crate::priors::LatentPrior;

pub struct NormalPrior {
    mode: usize,
    num_latent: usize,
    mu: Array1<f64>,
    lambda: Array2<f64>,
    // Normal-Wishart hyperprior
    mu0: Array1<f64>,
    kappa0: f64,
    t0_inv: Array2<f64>,
    df0: f64,
}

impl NormalPrior {
    pub fn new(mode: usize, num_latent: usize) -> Self {
        Self {
            mode,
            num_latent,
            mu: Array1::zeros(num_latent),
            lambda: Array2::eye(num_latent) * 10.0,
            mu0: Array1::zeros(num_latent),
            kappa0: 2.0,
            t0_inv: Array2::eye(num_latent),
            df0: num_latent as f64,
        }
    }

    fn tag(&self, field: &str) -> String {
        format!("prior_{}_{field}", self.mode)
    }
}

impl LatentPrior for NormalPrior {
    fn mode(&self) -> usize {
        self.mode
    }

    fn name(&self) -> &'static str {
        "normal"
    }

    fn init(&mut self, model: &Model, _data: &dyn TrainData) -> TrainResult<()> {
        if model.num_latent() != self.num_latent {
            return Err(TrainError::InvalidConfig(format!(
                "prior for mode {} built for {} latent dims, model has {}",
                self.mode,
                self.num_latent,
                model.num_latent()
            )));
        }
        Ok(())
    }

    fn sample_latents(
        &mut self,
        model: &mut Model,
        data: &dyn TrainData,
        base_seed: u64,
        iter: u64,
    ) -> TrainResult<()> {
        let mode = self.mode;
        let n = model.dims()[mode];
        let lambda_mu = self.lambda.dot(&self.mu);
        let rows = {
            let model_ref: &Model = model;
            (0..n)
                .into_par_iter()
                .map(|row| {
                    let seed = mix_seed(base_seed, &[iter, mode as u64, row as u64]);
                    let mut rng = StdRng::seed_from_u64(seed);
                    let mut r = lambda_mu.clone();
                    let mut q = self.lambda.clone();
                    data.get_pnm(model_ref, mode, row, &mut r, &mut q, &mut rng);
                    sample_gaussian_posterior(&mut rng, &q, &r)
                        .map_err(|source| TrainError::Numerical { mode, row, source })
                })
                .collect::<Result<Vec<Array1<f64>>, TrainError>>()?
        };
        let f = model.factor_mut(mode);
        for (i, x) in rows.into_iter().enumerate() {
            f.row_mut(i).assign(&x);
        }
        Ok(())
    }

    fn update_prior(
        &mut self,
        model: &Model,
        _data: &dyn TrainData,
        rng: &mut StdRng,
    ) -> TrainResult<()> {
        let f = model.factor(self.mode);
        let k = self.num_latent;
        // accumulated in row order: the stats feed a seeded draw, and a
        // nondeterministic summation order would break run reproducibility
        let mut sum = Array1::<f64>::zeros(k);
        let mut scatter = Array2::<f64>::zeros((k, k));
        for i in 0..f.nrows() {
            let row = f.row(i);
            for a in 0..k {
                sum[a] += row[a];
                for b in 0..k {
                    scatter[[a, b]] += row[a] * row[b];
                }
            }
        }
        let (mu, lambda) = cond_normal_wishart(
            rng,
            f.nrows(),
            &scatter,
            &sum,
            &self.mu0,
            self.kappa0,
            &self.t0_inv,
            self.df0,
        )
        .map_err(|source| TrainError::HyperUpdate {
            mode: self.mode,
            source,
        })?;
        self.mu = mu;
        self.lambda = lambda;
        Ok(())
    }

    fn save(&self, step: &mut StepWriter) -> anyhow::Result<()> {
        step.write_vector(&self.tag("mu"), &self.mu)?;
        step.write_matrix(&self.tag("lambda"), &self.lambda)?;
        Ok(())
    }

    fn restore(&mut self, step: &StepReader) -> anyhow::Result<()> {
        self.mu = step.read_vector(&self.tag("mu"))?;
        self.lambda = step.read_matrix(&self.tag("lambda"))?;
        Ok(())
    }

    fn status(&self) -> String {
        let mu_norm = self.mu.iter().map(|x| x * x).sum::<f64>().sqrt();
        format!("normal mode {}: |mu| = {mu_norm:.4}", self.mode)
    }
}
