use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use madrona_rf::{BaggedModel, Bagger, Dataset, FeatureSample, FeatureValue, Tree, TreeConfig};

#[derive(Parser)]
#[command(name = "madrona")]
#[command(about = "Bagged randomized regression trees with calibrated uncertainty")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Shared tuning parameters for ensemble training.
#[derive(Args, Debug, Clone)]
struct TuningArgs {
    /// Number of trees in the ensemble
    #[arg(long, default_value_t = 64)]
    bags: usize,

    /// Minimum rows required on each side of a split
    #[arg(long, default_value_t = 1)]
    min_instances: usize,

    /// Annealing temperature (lower = greedier split selection)
    #[arg(long, default_value_t = 1.0)]
    temperature: f64,

    /// Fraction of the training set drawn (with replacement) per bag
    #[arg(long, default_value_t = 1.0)]
    bag_fraction: f64,

    /// Fraction of features examined per split
    #[arg(long, default_value_t = 1.0 / 3.0)]
    feature_fraction: f64,

    /// Train a secondary bias model on out-of-bag residual magnitudes
    #[arg(long, default_value_t = false)]
    bias: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Train an ensemble on a synthetic benchmark function and report
    /// out-of-bag loss and feature importances
    Train {
        /// Number of training samples to generate
        #[arg(long, default_value_t = 500)]
        samples: usize,

        /// Number of pure-noise feature columns appended to the 5
        /// informative ones
        #[arg(long, default_value_t = 3)]
        noise_features: usize,

        /// Observation noise standard deviation
        #[arg(long, default_value_t = 0.5)]
        noise: f64,

        /// Path to write the fitted model to
        #[arg(long)]
        model_out: Option<PathBuf>,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Load a fitted model and evaluate it on freshly generated samples
    Predict {
        /// Path to a model written by `train --model-out`
        #[arg(long)]
        model: PathBuf,

        /// Number of evaluation samples to generate
        #[arg(long, default_value_t = 200)]
        samples: usize,

        /// Number of pure-noise feature columns (must match training)
        #[arg(long, default_value_t = 3)]
        noise_features: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure rayon thread pool")?;
    }

    match cli.command {
        Command::Train {
            samples,
            noise_features,
            noise,
            model_out,
            tuning,
        } => train(samples, noise_features, noise, model_out, &tuning, cli.seed),
        Command::Predict {
            model,
            samples,
            noise_features,
        } => predict(&model, samples, noise_features, cli.seed),
    }
}

fn init_tracing(verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    Ok(())
}

/// Friedman #1 benchmark: five informative features plus optional noise
/// columns.
fn friedman(x: &[f64]) -> f64 {
    10.0 * (std::f64::consts::PI * x[0] * x[1]).sin()
        + 20.0 * (x[2] - 0.5) * (x[2] - 0.5)
        + 10.0 * x[3]
        + 5.0 * x[4]
}

fn make_friedman(
    n_samples: usize,
    noise_features: usize,
    noise: f64,
    seed: u64,
) -> Result<(Dataset, Vec<f64>)> {
    let n_features = 5 + noise_features;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n_samples);
    let mut truth = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let row: Vec<f64> = (0..n_features).map(|_| rng.r#gen::<f64>()).collect();
        let y = friedman(&row);
        truth.push(y);
        labels.push(y + (rng.r#gen::<f64>() - 0.5) * 2.0 * noise);
        rows.push(row);
    }
    let data = Dataset::from_real(rows, labels).context("failed to build dataset")?;
    Ok((data, truth))
}

fn build_learner(tuning: &TuningArgs) -> TreeConfig {
    TreeConfig::new()
        .with_feature_sample(FeatureSample::Fraction(tuning.feature_fraction))
        .with_min_instances(tuning.min_instances)
        .with_temperature(tuning.temperature)
}

fn train(
    samples: usize,
    noise_features: usize,
    noise: f64,
    model_out: Option<PathBuf>,
    tuning: &TuningArgs,
    seed: u64,
) -> Result<()> {
    let (data, _) = make_friedman(samples, noise_features, noise, seed)?;
    info!(samples, n_features = data.n_features(), "generated training data");

    let learner = build_learner(tuning);
    let bagger = Bagger::new(learner, tuning.bags)
        .context("invalid ensemble configuration")?
        .with_bag_fraction(tuning.bag_fraction)
        .with_seed(seed);
    let result = if tuning.bias {
        bagger
            .with_bias_learner(build_learner(tuning).with_min_instances(8))
            .fit(&data)
    } else {
        bagger.fit(&data)
    }
    .context("ensemble training failed")?;

    match result.loss() {
        Some(loss) => println!("out-of-bag RMSE: {loss:.4}"),
        None => println!("out-of-bag RMSE: unavailable (no example left out of every bag)"),
    }
    println!("feature importances (relative):");
    for feature in result.importances().iter().take(8) {
        println!(
            "  #{rank:<2} {name:<6} {share:.4}",
            rank = feature.rank,
            name = feature.name,
            share = feature.relative
        );
    }

    let prediction = result.model().predict(data.rows())?;
    if let Some(uncertainty) = prediction.uncertainty() {
        let mean = uncertainty.iter().sum::<f64>() / uncertainty.len() as f64;
        println!("mean self-prediction uncertainty: {mean:.4}");
    }

    if let Some(path) = model_out {
        result
            .model()
            .save(&path)
            .with_context(|| format!("failed to save model to {}", path.display()))?;
        println!("model written to {}", path.display());
    }
    Ok(())
}

fn predict(model_path: &PathBuf, samples: usize, noise_features: usize, seed: u64) -> Result<()> {
    let model: BaggedModel<Tree> = BaggedModel::load(model_path)
        .with_context(|| format!("failed to load model from {}", model_path.display()))?;
    info!(n_models = model.n_models(), "model loaded");

    // Fresh draw, offset from the training seed.
    let (data, truth) = make_friedman(samples, noise_features, 0.0, seed.wrapping_add(1))?;
    let rows: Vec<Vec<FeatureValue>> = data.rows().to_vec();
    let prediction = model.predict(&rows)?;

    let mut squared_error = 0.0;
    for (p, &y) in prediction.expected().iter().zip(&truth) {
        let e = p.value() - y;
        squared_error += e * e;
    }
    let rmse = (squared_error / samples as f64).sqrt();
    println!("held-out RMSE: {rmse:.4}");

    match prediction.uncertainty() {
        Some(uncertainty) => {
            let mean = uncertainty.iter().sum::<f64>() / uncertainty.len() as f64;
            println!("mean predicted uncertainty: {mean:.4}");
        }
        None => println!("predicted uncertainty: unavailable"),
    }
    Ok(())
}
