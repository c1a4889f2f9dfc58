use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// The two builds being measured against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Reference build the candidate is judged against.
    Baseline,
    /// Build under test.
    Candidate,
}

impl Variant {
    /// File name of the synthesized harness page for this variant.
    pub fn harness_file_name(&self) -> &'static str {
        match self {
            Variant::Baseline => "baseline.html",
            Variant::Candidate => "candidate.html",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Baseline => write!(f, "baseline"),
            Variant::Candidate => write!(f, "candidate"),
        }
    }
}

/// How the baseline series is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonMode {
    /// Run the candidate only and compare against a stored results file.
    SingleBaselineFile,
    /// Run both variants live (reference source vs local build), one repeat.
    DevVsLocal,
    /// Run both variants live with several repeats per scenario.
    AveragedRepeats,
}

impl Default for ComparisonMode {
    fn default() -> Self {
        ComparisonMode::DevVsLocal
    }
}

impl std::fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonMode::SingleBaselineFile => write!(f, "single-baseline-file"),
            ComparisonMode::DevVsLocal => write!(f, "dev-vs-local"),
            ComparisonMode::AveragedRepeats => write!(f, "averaged-repeats"),
        }
    }
}

/// Regression tolerance policies supported by the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ToleranceKind {
    /// A flat percentage threshold.
    Fixed,
    /// Threshold widens as the baseline drops below the reference frame rate.
    FpsScaled,
}

impl Default for ToleranceKind {
    fn default() -> Self {
        ToleranceKind::Fixed
    }
}

impl std::fmt::Display for ToleranceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToleranceKind::Fixed => write!(f, "fixed"),
            ToleranceKind::FpsScaled => write!(f, "fps-scaled"),
        }
    }
}

/// Settings for posting the comparison report to a review thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Repository in `owner/name` form.
    #[serde(default)]
    pub repo: Option<String>,
    /// Pull request number hosting the report comment.
    #[serde(default)]
    pub pr_number: Option<u64>,
    /// Environment variable holding the API token. An unset variable disables
    /// posting; it is never an error.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            repo: None,
            pr_number: None,
            token_env: default_token_env(),
        }
    }
}

/// User configuration for the benchmark harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchSettings {
    #[serde(default)]
    pub mode: ComparisonMode,
    #[serde(default)]
    pub tolerance: ToleranceKind,
    /// Percent slowdown a candidate may show before it counts as a regression.
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,
    /// Repeats per (scenario, variant). Defaults to 1, or 3 in averaged mode.
    #[serde(default)]
    pub repeat_count: Option<u32>,
    /// Per-execution completion-signal timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Location of the built library under test.
    #[serde(default = "default_dist_path")]
    pub dist_path: PathBuf,
    /// Root directory holding benchmark scenarios.
    #[serde(default = "default_benchmark_path")]
    pub benchmark_path: PathBuf,
    /// File name of the library bundle inside `dist_path`.
    #[serde(default = "default_library_file")]
    pub library_file: String,
    /// Script source the baseline harness loads the library from.
    #[serde(default = "default_reference_url")]
    pub reference_url: String,
    /// Where to write raw candidate results. Doubles as the stored baseline
    /// for a later single-baseline-file run.
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    /// Prior results to compare against in single-baseline-file mode.
    #[serde(default)]
    pub baseline_file: Option<PathBuf>,
    /// Restrict the run to one scenario name.
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub sink: SinkSettings,
}

fn default_threshold_percent() -> f64 {
    5.0
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_dist_path() -> PathBuf {
    PathBuf::from("dist")
}

fn default_benchmark_path() -> PathBuf {
    PathBuf::from("benchmarks")
}

fn default_library_file() -> String {
    "renderer.min.js".into()
}

fn default_reference_url() -> String {
    "https://unpkg.com/renderer/dist/renderer.min.js".into()
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            mode: ComparisonMode::default(),
            tolerance: ToleranceKind::default(),
            threshold_percent: default_threshold_percent(),
            repeat_count: None,
            timeout_secs: default_timeout_secs(),
            dist_path: default_dist_path(),
            benchmark_path: default_benchmark_path(),
            library_file: default_library_file(),
            reference_url: default_reference_url(),
            output_file: None,
            baseline_file: None,
            scenario: None,
            sink: SinkSettings::default(),
        }
    }
}

impl BenchSettings {
    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
            let serialised = serde_json::to_string_pretty(&settings)?;
            fs::write(path, serialised)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to persist config to {}", path.display()))
    }

    /// Effective repeats for the configured mode. Averaged mode defaults to
    /// three repeats; everything else runs each scenario once.
    pub fn effective_repeats(&self) -> u32 {
        let fallback = match self.mode {
            ComparisonMode::AveragedRepeats => 3,
            _ => 1,
        };
        self.repeat_count.unwrap_or(fallback).max(1)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("io", "renderbench", "renderbench")
        .context("Unable to resolve platform config directory")?;
    Ok(dirs.config_dir().join("config.json"))
}
