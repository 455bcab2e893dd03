//! Evaluation harness
//!
//! Partitions a normalized population into a training sample and a holdout,
//! builds a model from the training sample through a [`ModelBuilder`], and
//! scores every holdout vector through the model's [`Classifier`].
//!
//! A holdout vector counts as correct when its true label is among the
//! classifier's candidate labels, not only when it is the top candidate.
//! Misses are split into false negatives (a good loan not recognised) and
//! false positives (a bad loan let through).

use crate::errors::{LcError, Result};
use crate::sampler::{sample_count, sample_indices, sample_size};
use crate::types::{
    FeatureSet, FeatureValue, LabelDistribution, Schema, StatusLabel, STATUS_FIELD,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Produces candidate labels for an unlabelled feature slice
pub trait Classifier {
    /// `schema` describes the vector the features came from; implementations
    /// reject features whose columns differ from what the model was built on.
    fn classify(&self, schema: &Schema, features: &[FeatureValue]) -> Result<LabelDistribution>;
}

/// Builds a model from labelled training vectors
pub trait ModelBuilder {
    type Model: Classifier;

    fn build(&self, training: &FeatureSet) -> Result<Self::Model>;
}

/// How a single holdout vector was scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Correct,
    FalsePositive,
    FalseNegative,
}

/// Outcome counters for one evaluation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationTally {
    pub total: usize,
    pub correct: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

impl EvaluationTally {
    /// Score one vector's true label against the classifier's candidates
    pub fn record(&mut self, truth: StatusLabel, candidates: &LabelDistribution) -> Outcome {
        self.total += 1;
        let outcome = if candidates.contains(truth) {
            Outcome::Correct
        } else if truth == StatusLabel::Good {
            Outcome::FalseNegative
        } else {
            Outcome::FalsePositive
        };
        match outcome {
            Outcome::Correct => self.correct += 1,
            Outcome::FalsePositive => self.false_positive += 1,
            Outcome::FalseNegative => self.false_negative += 1,
        }
        outcome
    }

    fn pct(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    pub fn accuracy_pct(&self) -> f64 {
        self.pct(self.correct)
    }

    pub fn false_positive_pct(&self) -> f64 {
        self.pct(self.false_positive)
    }

    pub fn false_negative_pct(&self) -> f64 {
        self.pct(self.false_negative)
    }
}

/// Sampling fractions for one evaluation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Share of the population used to build the model
    pub training_fraction: f64,
    /// Share of the population scored; `None` scores the whole remainder
    pub holdout_fraction: Option<f64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            training_fraction: 0.2,
            holdout_fraction: None,
        }
    }
}

/// Idle harness holding the sampling configuration
#[derive(Debug, Clone)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        sample_size(0, config.training_fraction)?;
        if let Some(fraction) = config.holdout_fraction {
            sample_size(0, fraction)?;
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Split a normalized population into training and holdout sets
    pub fn partition<R: Rng + ?Sized>(
        &self,
        population: FeatureSet,
        rng: &mut R,
    ) -> Result<Partitioned> {
        let population_size = population.len();
        let chosen = sample_indices(rng, population_size, self.config.training_fraction)?;
        let (training, remainder) = population.partition(&chosen);

        let holdout = match self.config.holdout_fraction {
            None => remainder,
            Some(fraction) => {
                let amount = sample_size(population_size, fraction)?;
                let picked = sample_count(rng, remainder.len(), amount);
                remainder.partition(&picked).0
            }
        };

        info!(
            "Partitioned {} vectors: {} training, {} holdout",
            population_size,
            training.len(),
            holdout.len()
        );
        Ok(Partitioned { training, holdout })
    }

    /// Partition and score in one step
    pub fn evaluate<B, R>(&self, population: FeatureSet, builder: &B, rng: &mut R) -> Result<Scored>
    where
        B: ModelBuilder,
        R: Rng + ?Sized,
    {
        self.partition(population, rng)?.score(builder)
    }
}

/// Population split into disjoint training and holdout sets
#[derive(Debug, Clone)]
pub struct Partitioned {
    pub training: FeatureSet,
    pub holdout: FeatureSet,
}

impl Partitioned {
    /// Build a model from the training set and score every holdout vector
    pub fn score<B: ModelBuilder>(self, builder: &B) -> Result<Scored> {
        if self.training.is_empty() {
            return Err(LcError::InvalidParameters(
                "training sample is empty".to_string(),
            ));
        }

        info!("Building model from {} training vectors", self.training.len());
        let model = builder.build(&self.training)?;

        let mut tally = EvaluationTally::default();
        for vector in self.holdout.vectors() {
            let truth = vector.label().ok_or_else(|| {
                LcError::violation(vector.id().to_string(), STATUS_FIELD, "has no label")
            })?;
            let candidates = model.classify(self.holdout.schema(), vector.features())?;
            let outcome = tally.record(truth, &candidates);
            debug!(loan = %vector.id(), %truth, %candidates, ?outcome, "Scored holdout vector");
        }

        info!(
            "Scored {} holdout vectors: {} correct, {} false positives, {} false negatives",
            tally.total, tally.correct, tally.false_positive, tally.false_negative
        );
        Ok(Scored {
            training_size: self.training.len(),
            tally,
        })
    }
}

/// Final state of an evaluation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scored {
    pub training_size: usize,
    pub tally: EvaluationTally,
}

/// Draw a training subsample of the population
pub fn training_sample<R: Rng + ?Sized>(
    population: &FeatureSet,
    fraction: f64,
    rng: &mut R,
) -> Result<FeatureSet> {
    let chosen: BTreeSet<usize> = sample_indices(rng, population.len(), fraction)?;
    Ok(population.select(chosen))
}

/// Candidate labels for one live loan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivePrediction {
    pub loan_id: FeatureValue,
    pub distribution: LabelDistribution,
}

/// Classify every vector of a live feed
pub fn score_live<M: Classifier + ?Sized>(
    model: &M,
    live: &FeatureSet,
) -> Result<Vec<LivePrediction>> {
    live.vectors()
        .iter()
        .map(|vector| {
            Ok(LivePrediction {
                loan_id: vector.id().clone(),
                distribution: model.classify(live.schema(), vector.features())?,
            })
        })
        .collect()
}
