//! Loan outcome feature pipeline
//!
//! Loads peer-lending loan feeds, reconciles the training and live schemas
//! into one ordered feature vector per loan, and measures how well a
//! classifier built on a random training sample labels the held-out loans.
//!
//! Modules:
//! - `record`: CSV loading and row inclusion filter
//! - `feed`: Fixed per-feed denylists, renames and presence rules
//! - `normalize`: Raw record → feature vector
//! - `sampler`: Uniform index sampling without replacement
//! - `tree`: Decision tree structure and classification
//! - `evaluation`: Model collaborator traits and the evaluation harness
//! - `report`: Evaluation and schema summaries
//! - `config`: TOML run configuration

pub mod config;
pub mod errors;
pub mod evaluation;
pub mod feed;
pub mod normalize;
pub mod record;
pub mod report;
pub mod sampler;
pub mod tree;
pub mod types;

pub use config::{DataConfig, EvaluationConfig, LcConfig, LoggingConfig, TreeConfig};
pub use errors::{LcError, Result};
pub use evaluation::{
    score_live, training_sample, Classifier, EvaluationTally, Harness, HarnessConfig,
    LivePrediction, ModelBuilder, Outcome, Partitioned, Scored,
};
pub use feed::{FeedKind, FeedProfile};
pub use normalize::{NormalizationOutcome, NormalizedRecord, Normalizer, RecordFailure};
pub use record::{LoadedFeed, LoadedRow, RawRecord, RecordLoader, RowRejection};
pub use report::{EvaluationReport, SchemaDiff};
pub use sampler::{complement, sample_indices};
pub use tree::{Criterion, DecisionTree, Node};
pub use types::{
    FeatureSet, FeatureValue, FeatureVector, LabelDistribution, Schema, StatusLabel,
    BAD_STATUSES,
};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
