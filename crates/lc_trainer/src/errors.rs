use lc_core::LcError;
use thiserror::Error;

/// Errors returned by the evaluation pipeline.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training error: {0}")]
    Training(String),

    #[error(transparent)]
    Core(#[from] LcError),
}
