//! Error type for the training engine.

use std::path::PathBuf;

use gibbsmf_kernels::KernelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("session must be initialized before stepping")]
    NotInitialized,

    #[error("numerical failure while sampling mode {mode}, row {row}: {source}")]
    Numerical {
        mode: usize,
        row: usize,
        #[source]
        source: KernelError,
    },

    #[error("hyperparameter update failed for mode {mode}: {source}")]
    HyperUpdate {
        mode: usize,
        #[source]
        source: KernelError,
    },

    #[error("resume required but no checkpoint found under '{path}'")]
    ResumeRequired { path: PathBuf },
}

pub type TrainResult<T> = Result<T, TrainError>;
