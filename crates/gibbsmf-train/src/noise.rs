//! Observation-noise models.
//!
//! The noise precision `α` scales every precision-and-mean accumulation in
//! the per-row Gibbs updates. Fixed noise keeps a configured constant;
//! adaptive noise resamples `α` from its conjugate Gamma posterior after
//! every sweep, capped so the implied signal-to-noise ratio cannot run away
//! early in burn-in. Probit has no precision of its own: binary observations
//! enter the updates through auxiliary truncated-normal draws instead.

use scirs2_core::random::Rng;
use serde::{Deserialize, Serialize};

use gibbsmf_kernels::{sample_gamma, KernelResult};

use crate::config::NoiseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NoiseModel {
    Fixed {
        precision: f64,
    },
    Adaptive {
        precision: f64,
        precision_max: f64,
        var_total: f64,
        sn_init: f64,
        sn_max: f64,
    },
    Probit,
}

impl NoiseModel {
    pub fn from_config(cfg: NoiseConfig) -> Self {
        match cfg {
            NoiseConfig::Fixed { precision } => NoiseModel::Fixed { precision },
            NoiseConfig::Adaptive { sn_init, sn_max } => NoiseModel::Adaptive {
                precision: sn_init + 1.0,
                precision_max: sn_max + 1.0,
                var_total: 1.0,
                sn_init,
                sn_max,
            },
            NoiseConfig::Probit => NoiseModel::Probit,
        }
    }

    /// Bind the model to the data's total variance. Called once at data init,
    /// after centering.
    pub fn init(&mut self, data_var: f64) {
        if let NoiseModel::Adaptive {
            precision,
            precision_max,
            var_total,
            sn_init,
            sn_max,
        } = self
        {
            // degenerate data (all values equal) falls back to unit variance
            *var_total = if data_var > 0.0 { data_var } else { 1.0 };
            *precision = (*sn_init + 1.0) / *var_total;
            *precision_max = (*sn_max + 1.0) / *var_total;
        }
    }

    /// Resample the precision from Gamma(a₀ + nnz/2, ...) given the current
    /// sum of squared residuals. No-op for fixed and probit noise.
    pub fn update<R: Rng>(&mut self, rng: &mut R, sumsq: f64, nnz: usize) -> KernelResult<()> {
        if let NoiseModel::Adaptive {
            precision,
            precision_max,
            var_total,
            ..
        } = self
        {
            let a = 0.5 + 0.5 * nnz as f64;
            let b = 0.5 * *var_total + 0.5 * sumsq;
            let drawn = sample_gamma(rng, a, 1.0 / b)?;
            *precision = drawn.min(*precision_max);
        }
        Ok(())
    }

    /// Precision used by the pnm kernels. Probit contributes unit weight.
    pub fn precision(&self) -> f64 {
        match self {
            NoiseModel::Fixed { precision } => *precision,
            NoiseModel::Adaptive { precision, .. } => *precision,
            NoiseModel::Probit => 1.0,
        }
    }

    pub fn is_probit(&self) -> bool {
        matches!(self, NoiseModel::Probit)
    }

    pub fn status(&self) -> String {
        match self {
            NoiseModel::Fixed { precision } => format!("fixed alpha = {precision:.4}"),
            NoiseModel::Adaptive {
                precision,
                precision_max,
                ..
            } => format!("adaptive alpha = {precision:.4} (max {precision_max:.4})"),
            NoiseModel::Probit => "probit".to_string(),
        }
    }
}
