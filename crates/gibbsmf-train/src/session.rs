//! The training session: burn-in → sampling state machine over Gibbs sweeps.
//!
//! One `step()` is a full sweep: for every mode, redraw all latent vectors,
//! refresh the data's cached sums, and redraw the mode's hyperparameters;
//! then update the noise model and fold the state into the test predictions.
//! Iteration counting starts at -1 (initialized, nothing sampled), burn-in
//! covers iterations `0..burnin`, sampling the rest. All randomness derives
//! from one base seed through per-(iteration, mode, row) substreams, so a
//! fixed seed reproduces the same run at any thread count.

use std::time::Instant;

use anyhow::{Context, Result};
use scirs2_core::random::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gibbsmf_core::SparseTensor;
use gibbsmf_kernels::mix_seed;

use crate::checkpoint::{CheckpointStore, StepReader};
use crate::config::{NoiseConfig, TrainConfig};
use crate::data::TrainData;
use crate::error::TrainError;
use crate::noise::NoiseModel;
use crate::model::Model;
use crate::priors::{create_prior, LatentPrior};
use crate::result::Predictions;
use crate::status::{Phase, StatusItem};

// Substream tags outside the row-index range, so they can never collide with
// a per-row stream.
const STREAM_MODEL_INIT: u64 = 0xffff_ffff_0000_0000;
const STREAM_HYPER: u64 = 0xffff_ffff_0000_0001;
const STREAM_NOISE: u64 = 0xffff_ffff_0000_0002;

#[derive(Serialize, Deserialize)]
struct SessionState {
    seed: u64,
}

pub struct TrainSession {
    config: TrainConfig,
    data: Box<dyn TrainData>,
    model: Model,
    priors: Vec<Box<dyn LatentPrior>>,
    predictions: Predictions,
    store: Option<CheckpointStore>,
    seed: u64,
    iter: i64,
    secs_per_iter: f64,
    secs_total: f64,
    last_checkpoint: Instant,
    is_init: bool,
}

impl std::fmt::Debug for TrainSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainSession")
            .field("seed", &self.seed)
            .field("iter", &self.iter)
            .field("is_init", &self.is_init)
            .finish_non_exhaustive()
    }
}

impl TrainSession {
    /// Assemble a session from its parts. Validates the configuration against
    /// the data shape; nothing is sampled until [`TrainSession::init`].
    pub fn from_config(
        config: TrainConfig,
        data: Box<dyn TrainData>,
        test: Option<&SparseTensor>,
    ) -> Result<Self> {
        let scarce = data.sparse_mode(0).is_some();
        config.validate(data.dims(), scarce)?;
        if let Some(t) = test {
            // every held-out coordinate must index into the trained factors
            if t.nmodes() != data.nmodes()
                || t.dims().iter().zip(data.dims()).any(|(td, dd)| td > dd)
            {
                return Err(TrainError::InvalidConfig(format!(
                    "test set shape {:?} does not fit the training data shape {:?}",
                    t.dims(),
                    data.dims()
                ))
                .into());
            }
        }
        let noise_matches = matches!(
            (&config.noise, data.noise()),
            (NoiseConfig::Fixed { .. }, NoiseModel::Fixed { .. })
                | (NoiseConfig::Adaptive { .. }, NoiseModel::Adaptive { .. })
                | (NoiseConfig::Probit, NoiseModel::Probit)
        );
        if !noise_matches {
            return Err(TrainError::InvalidConfig(
                "configured noise does not match the data's noise model".into(),
            )
            .into());
        }

        let priors: Vec<Box<dyn LatentPrior>> = config
            .priors
            .iter()
            .zip(&config.side_info)
            .enumerate()
            .map(|(mode, (&kind, side))| {
                create_prior(kind, mode, config.num_latent, side.clone())
            })
            .collect();

        let predictions = match test {
            Some(t) => Predictions::new(t, config.classify),
            None => Predictions::empty(),
        };

        let store = match &config.save_path {
            Some(path) => Some(CheckpointStore::create(path)?),
            None => None,
        };

        // placeholder until init() seeds the real model
        let mut rng = StdRng::seed_from_u64(0);
        let model = Model::init(
            config.num_latent,
            data.dims(),
            crate::config::ModelInit::Zeros,
            &mut rng,
        );

        Ok(Self {
            config,
            data,
            model,
            priors,
            predictions,
            store,
            seed: 0,
            iter: -1,
            secs_per_iter: f64::NAN,
            secs_total: 0.0,
            last_checkpoint: Instant::now(),
            is_init: false,
        })
    }

    /// Center the data, initialize the model and priors, and restore the
    /// latest checkpoint when one exists. Returns whether a checkpoint was
    /// restored.
    pub fn init(&mut self) -> Result<bool> {
        if self.is_init {
            return Err(TrainError::InvalidConfig("session initialized twice".into()).into());
        }
        self.seed = self.config.seed.unwrap_or_else(entropy_seed);
        self.data.init(self.config.center)?;

        let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, &[STREAM_MODEL_INIT]));
        self.model = Model::init(
            self.config.num_latent,
            self.data.dims(),
            self.config.model_init,
            &mut rng,
        );
        for i in 0..self.priors.len() {
            self.priors[i].init(&self.model, self.data.as_ref())?;
        }

        let mut resumed = false;
        if let Some(store) = &self.store {
            if let Some(step) = store.latest_checkpoint()? {
                info!("resuming from {}", step.path().display());
                self.restore(&step)
                    .with_context(|| format!("restoring {}", step.path().display()))?;
                resumed = true;
            } else if self.config.require_resume {
                return Err(TrainError::ResumeRequired {
                    path: store.root().to_path_buf(),
                }
                .into());
            }
        }
        if !resumed {
            self.iter = -1;
        }

        // cached per-mode sums reflect the (possibly restored) factors
        for m in 0..self.model.nmodes() {
            self.data.update_pnm(&self.model, m);
        }

        self.last_checkpoint = Instant::now();
        self.is_init = true;
        info!("session ready: {}", self.data.status());
        debug!("{}", StatusItem::csv_header());
        Ok(resumed)
    }

    /// Run one Gibbs sweep. Returns `false` once all iterations are done.
    pub fn step(&mut self) -> Result<bool> {
        if !self.is_init {
            return Err(TrainError::NotInitialized.into());
        }
        let niter = self.config.num_iterations() as i64;
        if self.iter + 1 >= niter {
            return Ok(false);
        }
        self.iter += 1;
        let started = Instant::now();

        for i in 0..self.priors.len() {
            let mode = self.priors[i].mode();
            self.priors[i].sample_latents(
                &mut self.model,
                self.data.as_ref(),
                self.seed,
                self.iter as u64,
            )?;
            self.data.update_pnm(&self.model, mode);

            let mut hyper_rng = StdRng::seed_from_u64(mix_seed(
                self.seed,
                &[self.iter as u64, mode as u64, STREAM_HYPER],
            ));
            self.priors[i].update_prior(&self.model, self.data.as_ref(), &mut hyper_rng)?;
        }

        let mut noise_rng =
            StdRng::seed_from_u64(mix_seed(self.seed, &[self.iter as u64, STREAM_NOISE]));
        self.data.update(&self.model, &mut noise_rng)?;

        let burnin = (self.iter as usize) < self.config.burnin;
        self.predictions
            .update(&self.model, self.data.as_ref(), burnin);

        self.secs_per_iter = started.elapsed().as_secs_f64();
        self.secs_total += self.secs_per_iter;
        info!("{}", self.status().as_csv());

        self.save()?;
        Ok(true)
    }

    /// Drive the session to completion: init (unless already done), then
    /// step until the last sampling iteration.
    pub fn run(&mut self) -> Result<()> {
        if !self.is_init {
            self.init()?;
        }
        while self.step()? {}
        Ok(())
    }

    pub fn status(&self) -> StatusItem {
        let burnin = self.config.burnin as i64;
        let (phase, iter, phase_len) = if self.iter < 0 {
            (Phase::Initial, 0, 0)
        } else if self.iter < burnin {
            (
                Phase::Burnin,
                (self.iter + 1) as u64,
                self.config.burnin as u64,
            )
        } else {
            (
                Phase::Sample,
                (self.iter - burnin + 1) as u64,
                self.config.num_samples as u64,
            )
        };
        let per_sec = |count: usize| {
            if self.secs_per_iter > 0.0 {
                count as f64 / self.secs_per_iter
            } else {
                0.0
            }
        };
        StatusItem {
            phase,
            iter,
            phase_len,
            absolute_iter: self.iter,
            model_norms: (0..self.model.nmodes()).map(|m| self.model.norm(m)).collect(),
            train_rmse: self.data.train_rmse(&self.model),
            rmse_avg: self.predictions.rmse_avg,
            rmse_1sample: self.predictions.rmse_1sample,
            auc_avg: self.predictions.auc_avg,
            auc_1sample: self.predictions.auc_1sample,
            elapsed_iter: self.secs_per_iter,
            elapsed_total: self.secs_total,
            obs_per_sec: per_sec(self.data.nnz()),
            samples_per_sec: per_sec(self.model.num_rows_total()),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn predictions(&self) -> &Predictions {
        &self.predictions
    }

    pub fn iteration(&self) -> i64 {
        self.iter
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Persist per the configured policy: a checkpoint when the wall-clock
    /// interval elapsed or on the final iteration, and a posterior sample
    /// when the sample index matches `save_freq` (negative keeps only the
    /// last sample).
    fn save(&mut self) -> Result<()> {
        if self.store.is_none()
            || (self.config.save_freq == 0 && self.config.checkpoint_freq_secs == 0)
        {
            return Ok(());
        }
        let niter = self.config.num_iterations() as i64;
        let final_iter = self.iter == niter - 1;
        let interval_due = self.config.checkpoint_freq_secs > 0
            && self.last_checkpoint.elapsed().as_secs() >= self.config.checkpoint_freq_secs;
        if interval_due || final_iter {
            let icheckpoint = self.iter + 1;
            self.write_step(icheckpoint, true)?;
            if let Some(store) = &self.store {
                store.remove_old_checkpoints(icheckpoint)?;
            }
            self.last_checkpoint = Instant::now();
        }

        let isample = self.iter - self.config.burnin as i64 + 1;
        if self.config.save_freq != 0 && isample > 0 {
            let keep = if self.config.save_freq > 0 {
                isample % self.config.save_freq as i64 == 0
            } else {
                isample == self.config.num_samples as i64
            };
            if keep {
                self.write_step(isample, false)?;
            }
        }
        Ok(())
    }

    fn write_step(&self, isample: i64, checkpoint: bool) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut step = store.create_step(isample, checkpoint)?;
        step.write_json("session", &SessionState { seed: self.seed })?;
        step.write_json("noise", self.data.noise())?;
        self.model.save(&mut step)?;
        self.predictions.save(&mut step)?;
        for p in &self.priors {
            p.save(&mut step)?;
        }
        let dir = step.commit()?;
        debug!("saved {}", dir.display());
        Ok(())
    }

    fn restore(&mut self, step: &StepReader) -> Result<()> {
        let state: SessionState = step.read_json("session")?;
        self.seed = state.seed;
        *self.data.noise_mut() = step.read_json("noise")?;
        self.model.restore(step)?;
        self.predictions.restore(step)?;
        for p in &mut self.priors {
            p.restore(step)?;
        }
        self.iter = if step.is_checkpoint() {
            step.isample() - 1
        } else {
            step.isample() + self.config.burnin as i64 - 1
        };
        Ok(())
    }
}

fn entropy_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed)
}
