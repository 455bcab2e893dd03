//! Loan outcome evaluation CLI
//!
//! Evaluates decision trees on historical loan feeds, classifies loans
//! currently in funding and compares the columns of the two feeds.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lc_core::LcConfig;
use lc_trainer::{rng_from_seed, Pipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_TRAINING_PATH: &str = "LoanStats.csv";
const DEFAULT_LIVE_PATH: &str = "InFundingStats.csv";

#[derive(Parser, Debug)]
#[command(name = "lc-eval")]
#[command(author = "LC Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Decision tree evaluation over peer-lending loan feeds", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a tree grown on a sample of the training feed against the rest
    Evaluate {
        /// Historical loan feed
        #[arg(long)]
        training: Option<PathBuf>,

        #[command(flatten)]
        sampling: SamplingArgs,

        /// Share of the population scored (default: the whole remainder)
        #[arg(long)]
        holdout_fraction: Option<f64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify every loan of the live feed
    Predict {
        /// Historical loan feed
        #[arg(long)]
        training: Option<PathBuf>,

        /// Loans currently in funding
        #[arg(long)]
        live: Option<PathBuf>,

        #[command(flatten)]
        sampling: SamplingArgs,

        /// Print the grown tree before the predictions
        #[arg(long)]
        show_tree: bool,

        /// Print the predictions as JSON
        #[arg(long)]
        json: bool,
    },

    /// List columns present in only one of the feeds
    Compare {
        /// Historical loan feed
        #[arg(long)]
        training: Option<PathBuf>,

        /// Loans currently in funding
        #[arg(long)]
        live: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SamplingArgs {
    /// Share of the training feed used to grow the tree
    #[arg(long)]
    fraction: Option<f64>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,
}

impl SamplingArgs {
    fn apply(&self, fraction: &mut f64, seed: &mut Option<u64>) {
        if let Some(value) = self.fraction {
            *fraction = value;
        }
        if self.seed.is_some() {
            *seed = self.seed;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LcConfig::load_from_file(path).context("Failed to load configuration")?,
        None => LcConfig::default(),
    };

    // Setup logging: RUST_LOG wins over the configured level
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("lc-eval v{}", lc_trainer::VERSION);

    let training_path = |arg: &Option<PathBuf>, config: &LcConfig| {
        arg.clone()
            .or_else(|| config.data.training_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRAINING_PATH))
    };
    let live_path = |arg: &Option<PathBuf>, config: &LcConfig| {
        arg.clone()
            .or_else(|| config.data.live_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIVE_PATH))
    };

    match &cli.command {
        Command::Evaluate {
            training,
            sampling,
            holdout_fraction,
            json,
        } => {
            let evaluation = &mut config.evaluation;
            sampling.apply(&mut evaluation.training_fraction, &mut evaluation.seed);
            if holdout_fraction.is_some() {
                config.evaluation.holdout_fraction = *holdout_fraction;
            }
            let training = training_path(training, &config);
            let mut rng = rng_from_seed(config.evaluation.seed);
            let pipeline = Pipeline::new(config)?;

            let report = pipeline
                .evaluate(&training, &mut rng)
                .with_context(|| format!("Evaluation of {} failed", training.display()))?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
        }

        Command::Predict {
            training,
            live,
            sampling,
            show_tree,
            json,
        } => {
            let evaluation = &mut config.evaluation;
            sampling.apply(&mut evaluation.prediction_fraction, &mut evaluation.seed);
            let training = training_path(training, &config);
            let live = live_path(live, &config);
            let mut rng = rng_from_seed(config.evaluation.seed);
            let pipeline = Pipeline::new(config)?;

            let result = pipeline
                .predict_live(&training, &live, &mut rng)
                .context("Live prediction failed")?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            if *show_tree {
                println!("{}", result.model);
            }
            for prediction in &result.predictions {
                println!(
                    "loan id={}, results={}",
                    prediction.loan_id, prediction.distribution
                );
            }
            if !result.failed_records.is_empty() {
                println!(
                    "{} live records skipped: {}",
                    result.failed_records.len(),
                    result.failed_records.join(", ")
                );
            }
        }

        Command::Compare { training, live } => {
            let training = training_path(training, &config);
            let live = live_path(live, &config);
            let pipeline = Pipeline::new(config)?;

            let diff = pipeline
                .compare(&training, &live)
                .context("Schema comparison failed")?;
            println!("{diff}");
        }
    }

    Ok(())
}
