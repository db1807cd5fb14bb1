//! Latent priors: one per mode, each owning that mode's hyperparameters.
//!
//! A Gibbs sweep calls `sample_latents` (redraw every latent vector of the
//! mode, conditioned on the other modes and the data) and then `update_prior`
//! (redraw the mode's hyperparameters from their conjugate posterior). Row
//! draws run in parallel; determinism at any thread count comes from seeding
//! each row's RNG with a `mix_seed(base, [iter, mode, row])` substream.

use scirs2_core::ndarray_ext::Array2;
use scirs2_core::random::rngs::StdRng;

use crate::checkpoint::{StepReader, StepWriter};
use crate::config::PriorKind;
use crate::data::TrainData;
use crate::error::TrainResult;
use crate::model::Model;

mod macau_one;
mod normal;

pub use macau_one::MacauOnePrior;
pub use normal::NormalPrior;

pub trait LatentPrior: Send {
    fn mode(&self) -> usize;
    fn name(&self) -> &'static str;

    /// Bind to the model and data shapes; checks mode-specific requirements.
    fn init(&mut self, model: &Model, data: &dyn TrainData) -> TrainResult<()>;

    /// Redraw every latent vector of this mode in place.
    fn sample_latents(
        &mut self,
        model: &mut Model,
        data: &dyn TrainData,
        base_seed: u64,
        iter: u64,
    ) -> TrainResult<()>;

    /// Redraw the hyperparameters from their conditional posterior.
    fn update_prior(
        &mut self,
        model: &Model,
        data: &dyn TrainData,
        rng: &mut StdRng,
    ) -> TrainResult<()>;

    fn save(&self, step: &mut StepWriter) -> anyhow::Result<()>;
    fn restore(&mut self, step: &StepReader) -> anyhow::Result<()>;
    fn status(&self) -> String;
}

pub fn create_prior(
    kind: PriorKind,
    mode: usize,
    num_latent: usize,
    side_info: Option<Array2<f64>>,
) -> Box<dyn LatentPrior> {
    match kind {
        PriorKind::Normal => Box::new(NormalPrior::new(mode, num_latent)),
        PriorKind::MacauOne => Box::new(MacauOnePrior::new(
            mode,
            num_latent,
            side_info.unwrap_or_else(|| Array2::zeros((0, 0))),
        )),
    }
}
