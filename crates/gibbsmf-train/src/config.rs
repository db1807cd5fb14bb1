//! Training configuration and eager validation.

use std::path::PathBuf;

use scirs2_core::ndarray_ext::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

/// Prior family for one mode's latent factor matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorKind {
    /// Shared Normal-Wishart hyperprior over the mode's latent vectors.
    Normal,
    /// Univariate-Gibbs prior with a dense side-information link (`uhat = F·β`).
    MacauOne,
}

/// Observation-noise model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NoiseConfig {
    /// Constant known precision.
    Fixed { precision: f64 },
    /// Gamma-resampled precision, capped at a maximum signal-to-noise ratio.
    Adaptive { sn_init: f64, sn_max: f64 },
    /// Binary observations through the truncated-normal auxiliary trick.
    Probit,
}

/// How the training data is mean-centered before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterMode {
    None,
    /// Subtract the global mean of all observed values.
    Global,
    /// Subtract the per-view mean (the global mean for single-view data).
    View,
    /// Subtract per-slice means along one mode. Dense data only.
    Mode(usize),
}

/// Initialization of the latent factor matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelInit {
    /// Standard-normal entries.
    Random,
    Zeros,
}

/// Everything a [`crate::TrainSession`] needs to know up front.
///
/// `save_freq` follows the convention of the persistence layer: `0` disables
/// sample saving, `n > 0` keeps every n-th posterior sample, and any negative
/// value keeps only the final one.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub num_latent: usize,
    pub burnin: usize,
    pub num_samples: usize,
    /// One prior per mode of the training data.
    pub priors: Vec<PriorKind>,
    /// Dense side-information matrix per mode (rows × features); required for
    /// [`PriorKind::MacauOne`] modes, forbidden elsewhere.
    pub side_info: Vec<Option<Array2<f64>>>,
    pub noise: NoiseConfig,
    pub center: CenterMode,
    pub model_init: ModelInit,
    pub save_freq: i32,
    /// Wall-clock seconds between crash-recovery checkpoints; `0` disables
    /// interval checkpointing.
    pub checkpoint_freq_secs: u64,
    /// Classification threshold; enables AUC tracking on the test set.
    pub classify: Option<f64>,
    /// Base RNG seed. `None` draws one from entropy at init.
    pub seed: Option<u64>,
    /// Root directory for checkpoints and posterior samples.
    pub save_path: Option<PathBuf>,
    /// Fail init unless a checkpoint can be restored from `save_path`.
    pub require_resume: bool,
}

impl TrainConfig {
    pub fn new(num_latent: usize, burnin: usize, num_samples: usize, priors: Vec<PriorKind>) -> Self {
        let nmodes = priors.len();
        Self {
            num_latent,
            burnin,
            num_samples,
            priors,
            side_info: vec![None; nmodes],
            noise: NoiseConfig::Fixed { precision: 5.0 },
            center: CenterMode::Global,
            model_init: ModelInit::Zeros,
            save_freq: 0,
            checkpoint_freq_secs: 0,
            classify: None,
            seed: None,
            save_path: None,
            require_resume: false,
        }
    }

    pub fn num_iterations(&self) -> usize {
        self.burnin + self.num_samples
    }

    /// Validate against the training data's shape. `scarce` is true when the
    /// data is sparse-observed (as opposed to fully dense).
    pub fn validate(&self, dims: &[usize], scarce: bool) -> TrainResult<()> {
        if self.num_latent == 0 {
            return Err(TrainError::InvalidConfig(
                "num_latent must be at least 1".into(),
            ));
        }
        if self.num_iterations() == 0 {
            return Err(TrainError::InvalidConfig(
                "burnin + num_samples must be at least 1".into(),
            ));
        }
        if self.priors.len() != dims.len() {
            return Err(TrainError::InvalidConfig(format!(
                "{} priors configured for {}-mode data",
                self.priors.len(),
                dims.len()
            )));
        }
        if self.side_info.len() != self.priors.len() {
            return Err(TrainError::InvalidConfig(format!(
                "side_info has {} slots for {} modes",
                self.side_info.len(),
                self.priors.len()
            )));
        }
        for (mode, (prior, side)) in self.priors.iter().zip(&self.side_info).enumerate() {
            match (prior, side) {
                (PriorKind::MacauOne, Some(f)) => {
                    if f.nrows() != dims[mode] {
                        return Err(TrainError::InvalidConfig(format!(
                            "side info for mode {mode} has {} rows, data has {}",
                            f.nrows(),
                            dims[mode]
                        )));
                    }
                    if f.ncols() == 0 {
                        return Err(TrainError::InvalidConfig(format!(
                            "side info for mode {mode} has no feature columns"
                        )));
                    }
                }
                (PriorKind::MacauOne, None) => {
                    return Err(TrainError::InvalidConfig(format!(
                        "MacauOne prior on mode {mode} requires side info"
                    )));
                }
                (PriorKind::Normal, Some(_)) => {
                    return Err(TrainError::InvalidConfig(format!(
                        "side info given for mode {mode} but its prior does not use any"
                    )));
                }
                (PriorKind::Normal, None) => {}
            }
        }
        match self.noise {
            NoiseConfig::Fixed { precision } => {
                if precision <= 0.0 {
                    return Err(TrainError::InvalidConfig(
                        "fixed noise precision must be positive".into(),
                    ));
                }
            }
            NoiseConfig::Adaptive { sn_init, sn_max } => {
                if sn_init <= 0.0 || sn_max < sn_init {
                    return Err(TrainError::InvalidConfig(
                        "adaptive noise needs 0 < sn_init <= sn_max".into(),
                    ));
                }
            }
            NoiseConfig::Probit => {
                if !scarce {
                    return Err(TrainError::InvalidConfig(
                        "probit noise requires sparse-observed data".into(),
                    ));
                }
                if self.center != CenterMode::None {
                    return Err(TrainError::InvalidConfig(
                        "probit noise requires uncentered data".into(),
                    ));
                }
                if self.priors.iter().any(|p| *p == PriorKind::MacauOne) {
                    return Err(TrainError::InvalidConfig(
                        "probit noise is not supported with the MacauOne prior".into(),
                    ));
                }
            }
        }
        match self.center {
            CenterMode::Mode(m) => {
                if scarce {
                    return Err(TrainError::InvalidConfig(
                        "per-mode centering requires dense data".into(),
                    ));
                }
                if m >= dims.len() {
                    return Err(TrainError::InvalidConfig(format!(
                        "centering mode {m} out of bounds for {}-mode data",
                        dims.len()
                    )));
                }
            }
            CenterMode::None | CenterMode::Global | CenterMode::View => {}
        }
        if (self.save_freq != 0 || self.checkpoint_freq_secs > 0) && self.save_path.is_none() {
            return Err(TrainError::InvalidConfig(
                "save_freq / checkpoint_freq_secs require a save_path".into(),
            ));
        }
        if self.require_resume && self.save_path.is_none() {
            return Err(TrainError::InvalidConfig(
                "require_resume needs a save_path to resume from".into(),
            ));
        }
        Ok(())
    }
}
