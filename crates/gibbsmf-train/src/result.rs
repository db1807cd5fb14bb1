//! Test-set prediction tracking.
//!
//! Every held-out entry keeps its last single-sample prediction and a running
//! posterior mean/variance over the sampling phase (Welford). Burn-in sweeps
//! update only the instantaneous prediction: they are not posterior samples
//! and must not pollute the average. With a classification threshold set, AUC
//! is tracked for both the single-sample and averaged predictions.

use scirs2_core::parallel_ops::*;
use serde::{Deserialize, Serialize};

use gibbsmf_core::SparseTensor;

use crate::checkpoint::{StepReader, StepWriter};
use crate::data::TrainData;
use crate::model::Model;

/// One held-out entry and its prediction state. `var` accumulates the
/// unnormalized second moment (Welford's M2); divide by `sample_iter - 1`
/// for the posterior predictive variance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultItem {
    pub coords: Vec<u32>,
    pub val: f64,
    pub pred_1sample: f64,
    pub pred_avg: f64,
    pub var: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictions {
    items: Vec<ResultItem>,
    threshold: Option<f64>,
    sample_iter: u64,
    burnin_iter: u64,
    pub rmse_1sample: f64,
    pub rmse_avg: f64,
    pub auc_1sample: f64,
    pub auc_avg: f64,
}

impl Predictions {
    pub fn new(test: &SparseTensor, threshold: Option<f64>) -> Self {
        let items = test
            .entries()
            .map(|(c, v)| ResultItem {
                coords: c.iter().copied().collect(),
                val: v,
                pred_1sample: 0.0,
                pred_avg: 0.0,
                var: 0.0,
            })
            .collect();
        Self {
            items,
            threshold,
            sample_iter: 0,
            burnin_iter: 0,
            rmse_1sample: f64::NAN,
            rmse_avg: f64::NAN,
            auc_1sample: f64::NAN,
            auc_avg: f64::NAN,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            threshold: None,
            sample_iter: 0,
            burnin_iter: 0,
            rmse_1sample: f64::NAN,
            rmse_avg: f64::NAN,
            auc_1sample: f64::NAN,
            auc_avg: f64::NAN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    pub fn sample_iter(&self) -> u64 {
        self.sample_iter
    }

    /// Fold the current model state into the predictions. Burn-in updates
    /// touch only the instantaneous prediction; sampling updates additionally
    /// advance the running posterior mean and variance.
    pub fn update(&mut self, model: &Model, data: &dyn TrainData, burnin: bool) {
        if self.items.is_empty() {
            return;
        }
        let n_items = self.items.len() as f64;

        if burnin {
            self.burnin_iter += 1;
            // partial errors combined in item order, keeping the reported
            // metrics identical across runs of the same seed
            let errs: Vec<f64> = self
                .items
                .par_iter_mut()
                .map(|item| {
                    let pred = model.dot(&item.coords) + data.offset(&item.coords);
                    item.pred_1sample = pred;
                    let d = pred - item.val;
                    d * d
                })
                .collect();
            let se: f64 = errs.into_iter().sum();
            self.rmse_1sample = (se / n_items).sqrt();
            if let Some(t) = self.threshold {
                self.auc_1sample = calc_auc(&self.items, |i| i.pred_1sample, t);
            }
            return;
        }

        self.sample_iter += 1;
        let n = self.sample_iter as f64;
        let errs: Vec<(f64, f64)> = self
            .items
            .par_iter_mut()
            .map(|item| {
                let pred = model.dot(&item.coords) + data.offset(&item.coords);
                item.pred_1sample = pred;
                let delta = pred - item.pred_avg;
                item.pred_avg += delta / n;
                item.var += delta * (pred - item.pred_avg);
                let d1 = pred - item.val;
                let da = item.pred_avg - item.val;
                (d1 * d1, da * da)
            })
            .collect();
        let (se_1, se_avg) = errs
            .into_iter()
            .fold((0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
        self.rmse_1sample = (se_1 / n_items).sqrt();
        self.rmse_avg = (se_avg / n_items).sqrt();
        if let Some(t) = self.threshold {
            self.auc_1sample = calc_auc(&self.items, |i| i.pred_1sample, t);
            self.auc_avg = calc_auc(&self.items, |i| i.pred_avg, t);
        }
    }

    pub fn save(&self, step: &mut StepWriter) -> anyhow::Result<()> {
        step.write_bin("predictions", self)
    }

    pub fn restore(&mut self, step: &StepReader) -> anyhow::Result<()> {
        *self = step.read_bin("predictions")?;
        Ok(())
    }
}

/// Rank-sum AUC of `key` against `val > threshold` labels. NaN when the
/// items hold only one class (the curve is degenerate).
pub fn calc_auc<F: Fn(&ResultItem) -> f64>(items: &[ResultItem], key: F, threshold: f64) -> f64 {
    let mut scored: Vec<(f64, bool)> = items
        .iter()
        .map(|i| (key(i), i.val > threshold))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut num_positive = 0u64;
    let mut num_negative = 0u64;
    let mut rank_sum = 0.0f64;
    for (_, positive) in scored {
        if positive {
            num_positive += 1;
            rank_sum += num_negative as f64;
        } else {
            num_negative += 1;
        }
    }
    if num_positive == 0 || num_negative == 0 {
        return f64::NAN;
    }
    rank_sum / (num_positive as f64 * num_negative as f64)
}
