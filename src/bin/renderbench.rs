use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{ArgAction, Parser, value_parser};
use renderbench::Harness;
use renderbench::config::{
    BenchSettings, ComparisonMode, ToleranceKind, default_config_path,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "renderbench", author, version, about = "Rendering benchmark harness and regression gate", long_about = None)]
struct Args {
    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Override the default configuration path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comparison mode.
    #[arg(long, value_enum)]
    mode: Option<ComparisonMode>,

    /// Tolerance policy applied by the comparator.
    #[arg(long, value_enum)]
    tolerance: Option<ToleranceKind>,

    /// Percent slowdown allowed before a scenario counts as regressed.
    #[arg(long)]
    threshold: Option<f64>,

    /// Repeats per (scenario, variant).
    #[arg(long)]
    repeats: Option<u32>,

    /// Per-execution completion-signal timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Location of the built library under test.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    dist: Option<PathBuf>,

    /// Root directory holding benchmark scenarios.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    benchmarks: Option<PathBuf>,

    /// Where to write raw candidate results.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    output: Option<PathBuf>,

    /// Stored results to compare against in single-baseline-file mode.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    baseline: Option<PathBuf>,

    /// Run a single scenario by name.
    #[arg(long)]
    scenario: Option<String>,

    /// Render the report to stdout without posting to the review thread.
    #[arg(long, action = ArgAction::SetTrue)]
    print_only: bool,
}

impl Args {
    fn apply_to(&self, settings: &mut BenchSettings) {
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(tolerance) = self.tolerance {
            settings.tolerance = tolerance;
        }
        if let Some(threshold) = self.threshold {
            settings.threshold_percent = threshold;
        }
        if self.repeats.is_some() {
            settings.repeat_count = self.repeats;
        }
        if let Some(timeout) = self.timeout_secs {
            settings.timeout_secs = timeout;
        }
        if let Some(dist) = &self.dist {
            settings.dist_path = dist.clone();
        }
        if let Some(benchmarks) = &self.benchmarks {
            settings.benchmark_path = benchmarks.clone();
        }
        if let Some(output) = &self.output {
            settings.output_file = Some(output.clone());
        }
        if let Some(baseline) = &self.baseline {
            settings.baseline_file = Some(baseline.clone());
        }
        if let Some(scenario) = &self.scenario {
            settings.scenario = Some(scenario.clone());
        }
        if self.print_only {
            settings.sink.repo = None;
            settings.sink.pr_number = None;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "renderbench=debug"
    } else {
        "renderbench=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => default_config_path()?,
    };
    info!(path = %config_path.display(), "using harness config");

    let mut settings = BenchSettings::load_or_default(&config_path)?;
    args.apply_to(&mut settings);

    let harness = Harness::from_settings(settings)?;
    let outcome = harness.run()?;

    println!("{}", outcome.rendered);

    if outcome.report.overall_regression {
        bail!("performance regression detected");
    }
    Ok(())
}
