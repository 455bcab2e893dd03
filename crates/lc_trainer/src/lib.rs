//! Loan outcome trainer
//!
//! Grows decision trees over normalized loan feeds and drives the
//! evaluation, live prediction and schema comparison runs.

pub mod cart;
pub mod errors;
pub mod pipeline;

pub use cart::CartBuilder;
pub use errors::TrainerError;
pub use pipeline::{rng_from_seed, LivePredictions, Pipeline};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
