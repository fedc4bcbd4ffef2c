//! SeldonLab CLI — data generation, specification building, training, experiments.
//!
//! Commands:
//! - `synth` — write a synthetic two-group dataset (CSV + metadata JSON)
//! - `spec` — compile constraints against a dataset and save a specification
//! - `train` — run the constrained engine once and print the outcome
//! - `run` — run a parallel, resumable experiment and export its report
//! - `report` — re-aggregate a results directory without training anything

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use seldonlab_core::data::{generate, load_dataset, write_dataset, Dataset, SyntheticConfig};
use seldonlab_core::models::ModelKind;
use seldonlab_core::parse_tree::FairnessTemplate;
use seldonlab_core::spec::OptimizationConfig;
use seldonlab_core::{make_parse_trees, run_seldonian, Outcome, SpecOptions, Specification};
use seldonlab_runner::export::{generate_report, save_report};
use seldonlab_runner::{
    aggregate, run_experiment, ExperimentConfig, HarnessProgress, PerformanceMetric, ResultStore,
};

/// Model trained under a specification.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum ModelArg {
    LogisticRegression,
    LinearRegression,
    RandomClassifier,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::LogisticRegression => ModelKind::LogisticRegression,
            ModelArg::LinearRegression => ModelKind::LinearRegression,
            ModelArg::RandomClassifier => ModelKind::RandomClassifier,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum TemplateArg {
    OverallAccuracyEquality,
    EqualOpportunity,
}

impl From<TemplateArg> for FairnessTemplate {
    fn from(arg: TemplateArg) -> Self {
        match arg {
            TemplateArg::OverallAccuracyEquality => FairnessTemplate::OverallAccuracyEquality,
            TemplateArg::EqualOpportunity => FairnessTemplate::EqualOpportunity,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum MetricArg {
    Accuracy,
    LogLoss,
    Mse,
}

impl From<MetricArg> for PerformanceMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Accuracy => PerformanceMetric::Accuracy,
            MetricArg::LogLoss => PerformanceMetric::LogLoss,
            MetricArg::Mse => PerformanceMetric::Mse,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "seldonlab",
    about = "SeldonLab CLI — machine learning with high-confidence behavioral constraints"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic dataset with two complementary sensitive groups.
    Synth {
        #[arg(long, default_value_t = 5000)]
        rows: usize,

        #[arg(long, default_value_t = 2)]
        features: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Output directory for data.csv and metadata.json.
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
    /// Compile constraints against a dataset and save the specification as JSON.
    Spec {
        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        metadata: PathBuf,

        /// Constraint string; repeat for several constraints.
        #[arg(long = "constraint")]
        constraints: Vec<String>,

        /// Fairness template rendered over `--groups`.
        #[arg(long, value_enum)]
        template: Option<TemplateArg>,

        /// Template tolerance; the threshold is 1 - epsilon.
        #[arg(long, default_value_t = 0.2)]
        epsilon: f64,

        /// The two group columns the template compares.
        #[arg(long, num_args = 2, value_names = ["A", "B"])]
        groups: Vec<String>,

        /// Confidence level per constraint; one value applies to all.
        #[arg(long = "delta", default_values_t = [0.05])]
        deltas: Vec<f64>,

        #[arg(long, value_enum, default_value_t = ModelArg::LogisticRegression)]
        model: ModelArg,

        #[arg(long, default_value_t = 0.5)]
        frac_safety: f64,

        #[arg(long)]
        num_iters: Option<usize>,

        #[arg(long, default_value_t = 0)]
        split_seed: u64,

        #[arg(long, default_value = "spec.json")]
        out: PathBuf,
    },
    /// Train once under a saved specification.
    Train {
        #[arg(long)]
        spec: PathBuf,
    },
    /// Run an experiment over data fractions and trials.
    Run {
        #[arg(long)]
        spec: PathBuf,

        /// Evaluation dataset CSV; defaults to the specification's dataset.
        #[arg(long, requires = "eval_metadata")]
        eval_data: Option<PathBuf>,

        #[arg(long)]
        eval_metadata: Option<PathBuf>,

        /// Experiment TOML; defaults apply to anything it omits.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        results_dir: Option<PathBuf>,

        #[arg(long)]
        n_trials: Option<usize>,

        #[arg(long)]
        n_workers: Option<usize>,

        /// Directory for report.json, report.csv, and report.md.
        #[arg(long, default_value = "report")]
        report_dir: PathBuf,
    },
    /// Aggregate a results directory into a report.
    Report {
        #[arg(long, default_value = "results")]
        results_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = MetricArg::Accuracy)]
        metric: MetricArg,

        #[arg(long, default_value = "report")]
        report_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Synth {
            rows,
            features,
            seed,
            out_dir,
        } => run_synth(rows, features, seed, &out_dir),
        Commands::Spec {
            data,
            metadata,
            constraints,
            template,
            epsilon,
            groups,
            deltas,
            model,
            frac_safety,
            num_iters,
            split_seed,
            out,
        } => {
            let constraints =
                resolve_constraints(constraints, template.map(Into::into), epsilon, &groups)?;
            let mut optimization = OptimizationConfig::default();
            if let Some(n) = num_iters {
                optimization.num_iters = n;
            }
            let options = SpecOptions {
                model: model.into(),
                frac_data_in_safety: frac_safety,
                optimization,
                split_seed,
                ..SpecOptions::default()
            };
            run_spec(&data, &metadata, &constraints, &deltas, options, &out)
        }
        Commands::Train { spec } => run_train(&spec),
        Commands::Run {
            spec,
            eval_data,
            eval_metadata,
            config,
            results_dir,
            n_trials,
            n_workers,
            report_dir,
        } => {
            let mut config = match config {
                Some(path) => ExperimentConfig::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => ExperimentConfig::default(),
            };
            if let Some(dir) = results_dir {
                config.results_dir = dir;
            }
            if let Some(n) = n_trials {
                config.n_trials = n;
            }
            if let Some(n) = n_workers {
                config.n_workers = n;
            }
            let evaluation = match (eval_data, eval_metadata) {
                (Some(csv), Some(meta)) => Some((csv, meta)),
                (None, None) => None,
                _ => bail!("--eval-data and --eval-metadata go together"),
            };
            run_experiment_cmd(&spec, evaluation, &config, &report_dir)
        }
        Commands::Report {
            results_dir,
            metric,
            report_dir,
        } => run_report(&results_dir, metric.into(), &report_dir),
    }
}

fn run_synth(rows: usize, features: usize, seed: u64, out_dir: &Path) -> Result<()> {
    let config = SyntheticConfig {
        n_rows: rows,
        n_features: features,
        ..SyntheticConfig::default()
    };
    let dataset = generate(&config, &mut StdRng::seed_from_u64(seed))?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let csv = out_dir.join("data.csv");
    let meta = out_dir.join("metadata.json");
    write_dataset(&dataset, &csv, &meta, "label")?;

    println!(
        "Wrote {} rows ({} features, groups {} / {}) to {}",
        dataset.n_rows(),
        dataset.n_features(),
        config.group_a_name,
        config.group_b_name,
        csv.display()
    );
    Ok(())
}

fn resolve_constraints(
    mut constraints: Vec<String>,
    template: Option<FairnessTemplate>,
    epsilon: f64,
    groups: &[String],
) -> Result<Vec<String>> {
    if let Some(template) = template {
        let [a, b] = groups else {
            bail!("--template needs --groups A B");
        };
        constraints.push(template.render(a, b, epsilon));
    }
    if constraints.is_empty() {
        bail!("give at least one --constraint or a --template");
    }
    Ok(constraints)
}

fn run_spec(
    data: &Path,
    metadata: &Path,
    constraints: &[String],
    deltas: &[f64],
    options: SpecOptions,
    out: &Path,
) -> Result<()> {
    let dataset = load_dataset(data, metadata)
        .with_context(|| format!("failed to load {}", data.display()))?;
    let columns = dataset.sensitive_names();
    let trees = make_parse_trees(constraints, deltas, &columns)?;
    for tree in &trees {
        println!("  {}  (delta = {})", tree, tree.delta());
    }
    let spec = Specification::new(dataset, trees, options)?;
    spec.save(out)?;
    println!("Specification saved to: {}", out.display());
    Ok(())
}

fn run_train(path: &Path) -> Result<()> {
    let spec = Specification::load(path)?;
    let result = run_seldonian(&spec)?;

    println!(
        "Candidate: objective {:.4}, {} iterations",
        result.candidate.objective, result.candidate.iterations
    );
    for (i, tree) in spec.parse_trees().iter().enumerate() {
        println!(
            "  [{}] {}  upper bound of g = {:.4}  {}",
            i,
            tree.source(),
            result.safety.upper_bounds[i],
            if result.safety.passed[i] { "pass" } else { "FAIL" }
        );
    }
    match &result.outcome {
        Outcome::Accepted { theta } => println!("Accepted: theta = {theta:?}"),
        Outcome::NoSolutionFound => println!("No Solution Found"),
    }
    Ok(())
}

fn run_experiment_cmd(
    spec_path: &Path,
    evaluation: Option<(PathBuf, PathBuf)>,
    config: &ExperimentConfig,
    report_dir: &Path,
) -> Result<()> {
    let spec = Arc::new(Specification::load(spec_path)?);
    let evaluation: Arc<Dataset> = match evaluation {
        Some((csv, meta)) => Arc::new(
            load_dataset(&csv, &meta)
                .with_context(|| format!("failed to load {}", csv.display()))?,
        ),
        None => Arc::new(spec.dataset().clone()),
    };

    let progress = |p: &HarnessProgress| {
        tracing::info!(
            done = p.completed,
            remaining = p.pending,
            failed = p.failed,
            elapsed_secs = p.elapsed_secs,
            "{}",
            p.last
        );
    };
    let run = run_experiment(
        spec,
        config,
        evaluation,
        Some(&progress as &dyn Fn(&HarnessProgress)),
    )?;
    println!(
        "Executed {} trials ({} skipped, {} failed)",
        run.executed, run.skipped, run.failed
    );

    let path = save_report(&run.report, report_dir)?;
    println!("{}", generate_report(&run.report));
    println!("Report saved to: {}", path.display());
    Ok(())
}

fn run_report(results_dir: &Path, metric: PerformanceMetric, report_dir: &Path) -> Result<()> {
    if !results_dir.exists() {
        bail!("results directory does not exist: {}", results_dir.display());
    }
    let store = ResultStore::open(results_dir)?;
    let report = aggregate(&store.load_all()?, metric);
    let path = save_report(&report, report_dir)?;
    println!("{}", generate_report(&report));
    println!("Report saved to: {}", path.display());
    Ok(())
}
