//! # gibbsmf-train
//!
//! The Gibbs-sampling training engine for Bayesian matrix and tensor
//! factorization. A [`TrainSession`] drives burn-in and sampling sweeps over
//! a [`Model`] (one latent factor matrix per mode), with one [`LatentPrior`]
//! per mode, a noise model, running test-set predictions, and crash-safe
//! checkpointing.
//!
//! ```no_run
//! use gibbsmf_core::SparseTensor;
//! use gibbsmf_train::{
//!     NoiseConfig, PriorKind, ScarceTensorData, TrainConfig, TrainSession,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let noise = NoiseConfig::Adaptive {
//!     sn_init: 1.0,
//!     sn_max: 10.0,
//! };
//! let train = SparseTensor::from_triplets(
//!     100, 50, &[0, 1, 2], &[3, 4, 5], &[1.0, 2.0, 3.0])?;
//! let data = ScarceTensorData::new(train, noise)?;
//!
//! let mut config = TrainConfig::new(
//!     16, 100, 400, vec![PriorKind::Normal, PriorKind::Normal]);
//! config.noise = noise;
//! config.seed = Some(1234);
//!
//! let mut session = TrainSession::from_config(config, Box::new(data), None)?;
//! session.run()?;
//! println!("train rmse: {}", session.status().train_rmse);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod noise;
pub mod priors;
pub mod result;
pub mod session;
pub mod status;

pub use checkpoint::{CheckpointStore, StepReader, StepWriter};
pub use config::{CenterMode, ModelInit, NoiseConfig, PriorKind, TrainConfig};
pub use data::{DenseMatrixData, ScarceTensorData, TrainData};
pub use error::{TrainError, TrainResult};
pub use model::Model;
pub use noise::NoiseModel;
pub use priors::{LatentPrior, MacauOnePrior, NormalPrior};
pub use result::{calc_auc, Predictions, ResultItem};
pub use session::TrainSession;
pub use status::{Phase, StatusItem};
