//! Evaluation, live prediction and schema comparison runs
//!
//! Each run loads its feeds from CSV, normalizes them and hands the
//! resulting feature sets to the harness or the tree builder.

use crate::cart::CartBuilder;
use crate::errors::TrainerError;
use chrono::{NaiveDate, Utc};
use lc_core::{
    score_live, training_sample, DecisionTree, EvaluationReport, FeedKind, FeedProfile, Harness,
    LcConfig, LivePrediction, ModelBuilder, NormalizationOutcome, Normalizer, RecordLoader,
    SchemaDiff,
};
use lc_core::types::STATUS_FIELD;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Model grown from the training feed and its answers for the live feed
#[derive(Debug, Clone, Serialize)]
pub struct LivePredictions {
    pub model: DecisionTree,
    pub predictions: Vec<LivePrediction>,
    /// Live records that failed normalization and were not scored
    pub failed_records: Vec<String>,
}

/// Configured pipeline shared by every run
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: LcConfig,
    as_of: NaiveDate,
}

impl Pipeline {
    pub fn new(config: LcConfig) -> Result<Self, TrainerError> {
        config.validate()?;
        Ok(Self {
            config,
            as_of: Utc::now().date_naive(),
        })
    }

    /// Reference date for credit line ages
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn config(&self) -> &LcConfig {
        &self.config
    }

    /// Load and normalize one feed
    ///
    /// Records that fail normalization are reported in the outcome, unless
    /// `abort_on_schema_violation` is set, in which case the first failure
    /// ends the run.
    pub fn load(&self, path: &Path, kind: FeedKind) -> Result<NormalizationOutcome, TrainerError> {
        let feed = RecordLoader::for_kind(kind).load_path(path)?;
        let normalizer = Normalizer::new(FeedProfile::for_kind(kind)).with_as_of(self.as_of);
        let mut outcome = normalizer.normalize_feed(&feed);

        if self.config.evaluation.abort_on_schema_violation && !outcome.failures.is_empty() {
            let first = outcome.failures.swap_remove(0);
            return Err(first.error.into());
        }
        Ok(outcome)
    }

    /// Score a tree grown on a random sample of the training feed against
    /// the rest of it
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        training: &Path,
        rng: &mut R,
    ) -> Result<EvaluationReport, TrainerError> {
        let outcome = self.load(training, FeedKind::Training)?;
        if outcome.set.is_empty() {
            return Err(TrainerError::Dataset(format!(
                "no usable records in {}",
                training.display()
            )));
        }

        let failed_records = outcome
            .failed_records()
            .into_iter()
            .map(str::to_string)
            .collect();
        let harness = Harness::new(self.config.evaluation.harness())?;
        let builder = CartBuilder::new(self.config.tree.clone());
        let scored = harness.evaluate(outcome.set, &builder, rng)?;

        Ok(EvaluationReport::new(&scored, failed_records))
    }

    /// Grow a tree on a sample of the training feed and classify every
    /// loan of the live feed
    pub fn predict_live<R: Rng + ?Sized>(
        &self,
        training: &Path,
        live: &Path,
        rng: &mut R,
    ) -> Result<LivePredictions, TrainerError> {
        let population = self.load(training, FeedKind::Training)?.set;
        let sample = training_sample(
            &population,
            self.config.evaluation.prediction_fraction,
            rng,
        )?;
        if sample.is_empty() {
            return Err(TrainerError::Training(format!(
                "training sample of {} is empty",
                training.display()
            )));
        }

        let model = CartBuilder::new(self.config.tree.clone()).build(&sample)?;

        let live_outcome = self.load(live, FeedKind::Live)?;
        if live_outcome.set.is_empty() {
            return Err(TrainerError::Dataset(format!(
                "no usable records in {}",
                live.display()
            )));
        }
        let failed_records = live_outcome
            .failed_records()
            .into_iter()
            .map(str::to_string)
            .collect();
        let predictions = score_live(&model, &live_outcome.set)?;
        info!("Classified {} live loans", predictions.len());

        Ok(LivePredictions {
            model,
            predictions,
            failed_records,
        })
    }

    /// Kept feature columns, after renames, that appear in only one of the feeds
    pub fn compare(&self, training: &Path, live: &Path) -> Result<SchemaDiff, TrainerError> {
        let training_headers = kept_headers(training, FeedKind::Training)?;
        let live_headers = kept_headers(live, FeedKind::Live)?;

        let diff = SchemaDiff::between(&training_headers, &live_headers);
        if !diff.is_empty() {
            warn!(
                "Feeds disagree on {} columns",
                diff.only_in_training.len() + diff.only_in_live.len()
            );
        }
        Ok(diff)
    }
}

fn kept_headers(path: &Path, kind: FeedKind) -> Result<Vec<String>, TrainerError> {
    let loader = RecordLoader::for_kind(kind);
    let feed = loader.load_path(path)?;
    let profile = loader.profile();

    Ok(feed
        .headers
        .iter()
        .filter(|header| header.as_str() != STATUS_FIELD && !profile.is_denied(header))
        .map(|header| profile.canonical_name(header).to_string())
        .collect())
}

/// Sampling rng: seeded for reproducible runs, OS entropy otherwise
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
