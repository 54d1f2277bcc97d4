//! grounder CLI - train, apply and inspect grounding models
//!
//! Subcommands:
//!
//! 1. train:    Corpus → feature templates → sharded L-BFGS → model.xml
//! 2. ground:   Corpus + model → best grounding for every phrase
//! 3. inspect:  model → feature count and heaviest weights
//! 4. evaluate: Corpus + model → accuracy, precision/recall/F1, log-likelihood
//!
//! Logs go to stderr through tracing; results go to stdout so they can be
//! piped. `RUST_LOG` overrides the default filter.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use grounder::persist;
use grounder::training::LiveProgress;
use grounder::{
    Corpus, Enumerator, EvalMetrics, FeatureRegistry, Llm, Trainer, TrainingConfig,
};

/// Ground natural-language instructions in a world model
///
/// Examples:
///   grounder train --corpus corpus.json --model model.xml
///   grounder ground --corpus test.json --model model.xml
///   grounder inspect --model model.xml --top 30
///   grounder evaluate --corpus heldout.json --model model.xml --json
#[derive(Parser, Debug)]
#[command(name = "grounder")]
#[command(version)]
#[command(about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    ///
    /// Raises the default log level to debug and prints progress
    /// messages to stderr. RUST_LOG takes precedence when set.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Learn model weights from an annotated corpus
    Train {
        /// Annotated corpus (JSON)
        #[arg(long)]
        corpus: PathBuf,

        /// Where to write the trained model (XML)
        #[arg(long)]
        model: PathBuf,

        /// Configuration file
        ///
        /// Defaults to the nearest grounder.toml in the working directory
        /// or one of its parents.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker threads (one model replica each)
        #[arg(long)]
        threads: Option<usize>,

        /// L2 regularization strength λ
        #[arg(long)]
        lambda: Option<f64>,

        /// Optimizer iteration cap
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Fraction of sentences held out and evaluated after training
        #[arg(long)]
        holdout: Option<f64>,

        /// Seed for the holdout shuffle
        #[arg(long)]
        seed: Option<u64>,

        /// Disable the live sparkline display
        #[arg(long)]
        no_progress: bool,
    },

    /// Print the best grounding of every phrase
    Ground {
        #[arg(long)]
        corpus: PathBuf,

        #[arg(long)]
        model: PathBuf,
    },

    /// Summarize a model file
    Inspect {
        #[arg(long)]
        model: PathBuf,

        /// Number of features to list, heaviest first
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Score a model against an annotated corpus
    Evaluate {
        #[arg(long)]
        corpus: PathBuf,

        #[arg(long)]
        model: PathBuf,

        /// Print metrics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Train {
            corpus,
            model,
            config,
            threads,
            lambda,
            max_iterations,
            holdout,
            seed,
            no_progress,
        } => {
            let mut config = TrainingConfig::load(config.as_deref(), &std::env::current_dir()?)?;
            if let Some(threads) = threads {
                config.threads = threads;
            }
            if let Some(lambda) = lambda {
                config.regularization = lambda;
            }
            if let Some(max_iterations) = max_iterations {
                config.max_iterations = max_iterations;
            }
            if let Some(holdout) = holdout {
                config.holdout = holdout;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            config.validate().context("Invalid training options")?;
            run_train(&corpus, &model, config, cli.verbose, !no_progress)
        }
        Command::Ground { corpus, model } => run_ground(&corpus, &model),
        Command::Inspect { model, top } => run_inspect(&model, top),
        Command::Evaluate {
            corpus,
            model,
            json,
        } => run_evaluate(&corpus, &model, json),
    }
}

fn load_model(path: &Path) -> Result<Llm> {
    persist::load(path, &FeatureRegistry::default())
        .with_context(|| format!("Failed to load model {}", path.display()))
}

fn run_train(
    corpus_path: &Path,
    model_path: &Path,
    config: TrainingConfig,
    verbose: bool,
    show_progress: bool,
) -> Result<()> {
    let start = Instant::now();
    if verbose {
        eprintln!("🧭 grounder v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("{}", config.display_summary());
    }

    let corpus = Corpus::load(corpus_path)?;
    let (train, heldout) = corpus.split(config.holdout, config.seed);
    if train.is_empty() {
        anyhow::bail!("No training sentences in {}", corpus_path.display());
    }

    let registry = FeatureRegistry::default();
    let feature_set = train
        .templates()
        .build(&registry)
        .context("Failed to build feature templates")?;
    let feature_set = Arc::new(feature_set);

    let enumerator = Enumerator::new(None);
    let examples = train.examples(&enumerator);
    if verbose {
        eprintln!(
            "✓ {} sentences → {} examples, {} features ({} leaves)",
            train.len(),
            examples.len(),
            feature_set.len(),
            feature_set.num_leaves()
        );
    }

    let trainer = Trainer::new(feature_set, config.clone());
    let mut progress = LiveProgress::new(config.max_iterations);
    let (llm, report) = trainer
        .train(&examples, |stats| {
            progress.record(stats);
            if show_progress && !verbose {
                progress.display();
            }
        })
        .context("Training failed")?;

    if show_progress {
        progress.final_summary(report.termination);
    }
    persist::save(&llm, model_path)
        .with_context(|| format!("Failed to save model {}", model_path.display()))?;

    println!(
        "{} {} features, {} iterations, log-likelihood {:.4} ({:.2?})",
        "Saved".green().bold(),
        report.features,
        report.history.len(),
        report.objective,
        start.elapsed()
    );
    println!("  → {}", model_path.display());

    if !heldout.is_empty() {
        let metrics = EvalMetrics::evaluate(&llm, &heldout.examples(&enumerator));
        println!();
        println!("{} ({} sentences)", "Held-out".bold(), heldout.len());
        print_metrics(&metrics);
    }
    Ok(())
}

fn run_ground(corpus_path: &Path, model_path: &Path) -> Result<()> {
    let llm = load_model(model_path)?;
    let corpus = Corpus::load(corpus_path)?;
    let enumerator = Enumerator::new(Some(Arc::new(llm)));

    for sentence in &corpus.sentences {
        let graph = enumerator.ground(&sentence.root, sentence.world.clone(), &sentence.search_space());
        println!("{} {}", "▸".cyan(), sentence.text.bold());
        for phrase in graph.best_groundings() {
            let label = format!("{}", phrase.phrase);
            match phrase.best {
                Some((_, grounding, probability)) => println!(
                    "    {:<32} {} {}",
                    label,
                    grounding.to_string().green(),
                    format!("({:.3})", probability).dimmed()
                ),
                None => println!("    {:<32} {}", label, "no compatible grounding".dimmed()),
            }
        }
    }
    Ok(())
}

fn run_inspect(model_path: &Path, top: usize) -> Result<()> {
    let llm = load_model(model_path)?;
    let set = llm.feature_set();

    println!("{}", model_path.display().to_string().bold());
    println!("  Features: {}", set.len());
    println!("  Leaves:   {}", set.num_leaves());

    let mut ranked: Vec<(usize, f64)> = llm
        .weights()
        .iter()
        .copied()
        .enumerate()
        .take(set.len())
        .collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    println!();
    for (index, weight) in ranked.into_iter().take(top) {
        let signature = set
            .feature(index)
            .map(|f| f.signature())
            .unwrap_or_default();
        let weight_str = format!("{:>+10.4}", weight);
        let weight_str = if weight >= 0.0 {
            weight_str.green().to_string()
        } else {
            weight_str.red().to_string()
        };
        println!("  {} {}", weight_str, signature);
    }
    Ok(())
}

fn run_evaluate(corpus_path: &Path, model_path: &Path, json: bool) -> Result<()> {
    let llm = load_model(model_path)?;
    let corpus = Corpus::load(corpus_path)?;
    let examples = corpus.examples(&Enumerator::new(None));
    let metrics = EvalMetrics::evaluate(&llm, &examples);

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        print_metrics(&metrics);
    }
    Ok(())
}

fn print_metrics(metrics: &EvalMetrics) {
    println!("  {:<20} {}", "Examples".bold(), metrics.n_cases);
    println!("  {:<20} {:.4}", "Accuracy".bold(), metrics.accuracy);
    println!(
        "  {:<20} {:.4}  (tp {} / fp {})",
        "Precision".bold(),
        metrics.precision,
        metrics.true_positives,
        metrics.false_positives
    );
    println!(
        "  {:<20} {:.4}  (fn {})",
        "Recall".bold(),
        metrics.recall,
        metrics.false_negatives
    );
    println!("  {:<20} {:.4}", "F1".bold(), metrics.f1);
    println!(
        "  {:<20} {:.4} ± {:.4}",
        "Log-likelihood".bold(),
        metrics.mean_log_likelihood,
        metrics.log_likelihood_std
    );
}
