//! Per-iteration status snapshots and their CSV rendering.

use std::fmt;

use serde::Serialize;

/// Which part of the run an iteration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Initial,
    Burnin,
    Sample,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initial => "Initial",
            Phase::Burnin => "Burnin",
            Phase::Sample => "Sample",
        };
        f.write_str(name)
    }
}

/// Snapshot of one iteration, as logged and exposed by the session.
#[derive(Debug, Clone, Serialize)]
pub struct StatusItem {
    pub phase: Phase,
    /// 1-based iteration within the phase.
    pub iter: u64,
    /// Length of the phase the iteration belongs to.
    pub phase_len: u64,
    /// Absolute iteration across burn-in and sampling; -1 before the first
    /// sweep.
    pub absolute_iter: i64,
    /// Frobenius norm per mode factor.
    pub model_norms: Vec<f64>,
    pub train_rmse: f64,
    pub rmse_avg: f64,
    pub rmse_1sample: f64,
    pub auc_avg: f64,
    pub auc_1sample: f64,
    pub elapsed_iter: f64,
    pub elapsed_total: f64,
    /// Observed entries processed per second in the last iteration.
    pub obs_per_sec: f64,
    /// Latent vectors redrawn per second in the last iteration.
    pub samples_per_sec: f64,
}

impl StatusItem {
    pub fn csv_header() -> &'static str {
        "phase;iter;phase_len;rmse_avg;rmse_1samp;train_rmse;auc_avg;auc_1samp;elapsed_1samp;elapsed_total"
    }

    pub fn as_csv(&self) -> String {
        format!(
            "{};{};{};{:.4};{:.4};{:.4};{:.4};{:.4};{:.4};{:.4}",
            self.phase,
            self.iter,
            self.phase_len,
            self.rmse_avg,
            self.rmse_1sample,
            self.train_rmse,
            self.auc_avg,
            self.auc_1sample,
            self.elapsed_iter,
            self.elapsed_total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_row_matches_the_header_layout() {
        let item = StatusItem {
            phase: Phase::Sample,
            iter: 3,
            phase_len: 10,
            absolute_iter: 7,
            model_norms: vec![1.0, 2.0],
            train_rmse: 0.5,
            rmse_avg: 0.9,
            rmse_1sample: 1.1,
            auc_avg: 0.75,
            auc_1sample: 0.7,
            elapsed_iter: 0.25,
            elapsed_total: 2.5,
            obs_per_sec: 1000.0,
            samples_per_sec: 50.0,
        };
        let row = item.as_csv();
        assert_eq!(
            row.split(';').count(),
            StatusItem::csv_header().split(';').count()
        );
        assert_eq!(row, "Sample;3;10;0.9000;1.1000;0.5000;0.7500;0.7000;0.2500;2.5000");
    }
}
