//! Run configuration
//!
//! Loaded from an optional TOML file. Every section and field has a default,
//! so a partial file (or none at all) is valid.

use crate::errors::{LcError, Result};
use crate::evaluation::HarnessConfig;
use crate::sampler::sample_size;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcConfig {
    /// Input feeds
    pub data: DataConfig,
    /// Sampling and failure policy
    pub evaluation: EvaluationConfig,
    /// Tree induction parameters
    pub tree: TreeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Input feed locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Historical loans with known outcomes
    pub training_path: Option<PathBuf>,
    /// Loans currently in funding
    pub live_path: Option<PathBuf>,
}

/// Evaluation run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Share of the population used for training
    pub training_fraction: f64,
    /// Share of the population scored; unset scores the whole remainder
    pub holdout_fraction: Option<f64>,
    /// Share of the training feed used to grow the tree for live prediction
    pub prediction_fraction: f64,
    /// Seed for the sampling rng; unset draws from OS entropy
    pub seed: Option<u64>,
    /// Abort the run on the first record that fails normalization
    pub abort_on_schema_violation: bool,
}

/// Parameters for growing a single tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Splits gaining no more than this (in bits) become leaves
    pub min_gain: f64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is unset
    pub level: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            training_fraction: 0.2,
            holdout_fraction: None,
            prediction_fraction: 0.1,
            seed: None,
            abort_on_schema_violation: false,
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 12,
            min_samples_leaf: 1,
            min_gain: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EvaluationConfig {
    pub fn harness(&self) -> HarnessConfig {
        HarnessConfig {
            training_fraction: self.training_fraction,
            holdout_fraction: self.holdout_fraction,
        }
    }
}

impl LcConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| LcError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LcError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        sample_size(0, self.evaluation.training_fraction)
            .map_err(|e| LcError::Config(format!("evaluation.training_fraction: {e}")))?;
        if let Some(fraction) = self.evaluation.holdout_fraction {
            sample_size(0, fraction)
                .map_err(|e| LcError::Config(format!("evaluation.holdout_fraction: {e}")))?;
        }
        sample_size(0, self.evaluation.prediction_fraction)
            .map_err(|e| LcError::Config(format!("evaluation.prediction_fraction: {e}")))?;
        if self.tree.max_depth == 0 {
            return Err(LcError::Config("tree.max_depth must be at least 1".to_string()));
        }
        if self.tree.min_samples_leaf == 0 {
            return Err(LcError::Config(
                "tree.min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if !self.tree.min_gain.is_finite() || self.tree.min_gain < 0.0 {
            return Err(LcError::Config(
                "tree.min_gain must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}
