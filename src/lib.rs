pub mod compare;
pub mod config;
pub mod discovery;
pub mod error;
pub mod report;
pub mod sampling;
pub mod sandbox;
pub mod server;
pub mod sink;

use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::compare::{RegressionReport, TolerancePolicy, compare};
use crate::config::{BenchSettings, ComparisonMode, Variant};
use crate::discovery::{HarnessSources, ScenarioEntry};
use crate::report::{REPORT_MARKER, render};
use crate::sampling::AggregatedMetric;
use crate::sandbox::{ChromeSandboxFactory, SandboxFactory};
use crate::server::StaticServer;
use crate::sink::{CommentSink, GithubCommentSink, PostAction, post_or_update};

/// Primary orchestrator: discovers scenarios, drives sandboxed executions,
/// compares the two result series, and publishes the report.
pub struct Harness {
    settings: BenchSettings,
}

/// Result of one full invocation.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RegressionReport,
    pub rendered: String,
    pub posted: Option<PostAction>,
    pub output_file: Option<PathBuf>,
}

/// One line of the raw-results file. Candidate results are persisted in
/// execution order; the same shape is accepted back as a stored baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub name: String,
    pub variant: Variant,
    pub fps: f64,
    pub samples: Vec<f64>,
}

/// Stored-baseline rows only need a name and an fps; extra fields from older
/// result files are ignored, and a missing fps becomes an incomparable NaN.
#[derive(Debug, Deserialize)]
struct BaselineRecord {
    name: String,
    #[serde(default)]
    fps: Option<f64>,
}

impl Harness {
    /// Validate required inputs and build the harness.
    pub fn from_settings(settings: BenchSettings) -> Result<Self> {
        if !settings.benchmark_path.is_dir() {
            bail!(
                "Benchmark root {} does not exist",
                settings.benchmark_path.display()
            );
        }
        if !settings.dist_path.join(&settings.library_file).is_file() {
            bail!(
                "Built library {} not found under {}",
                settings.library_file,
                settings.dist_path.display()
            );
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &BenchSettings {
        &self.settings
    }

    /// Run the full pipeline with freshly launched browser sandboxes.
    pub fn run(&self) -> Result<RunOutcome> {
        self.run_with_factory(&ChromeSandboxFactory::default())
    }

    /// Run the full pipeline against an explicit sandbox factory, posting
    /// through the configured GitHub sink.
    pub fn run_with_factory<F: SandboxFactory>(&self, factory: &F) -> Result<RunOutcome> {
        self.run_with_components::<F, GithubCommentSink>(factory, None)
    }

    /// Run the full pipeline against an explicit sandbox factory and, when
    /// given, an explicit comment sink instead of the configured one.
    ///
    /// The static server is released unconditionally: teardown failures are
    /// logged and never mask the run's own outcome.
    pub fn run_with_components<F: SandboxFactory, S: CommentSink>(
        &self,
        factory: &F,
        sink: Option<&S>,
    ) -> Result<RunOutcome> {
        let span = info_span!("harness.run", mode = %self.settings.mode);
        let _span_guard = span.enter();

        let server = StaticServer::start(
            self.settings.dist_path.clone(),
            self.settings.benchmark_path.clone(),
        )?;
        let outcome = self.run_scenarios(factory, &server, sink);
        if let Err(err) = server.shutdown() {
            warn!(error = %err, "static server teardown failed");
        }
        outcome
    }

    fn run_scenarios<F: SandboxFactory, S: CommentSink>(
        &self,
        factory: &F,
        server: &StaticServer,
        sink: Option<&S>,
    ) -> Result<RunOutcome> {
        let mut entries = discovery::discover(&self.settings.benchmark_path)?;
        if let Some(filter) = &self.settings.scenario {
            entries.retain(|entry| &entry.name == filter);
            if entries.is_empty() {
                bail!(
                    "Scenario {filter} not found under {}",
                    self.settings.benchmark_path.display()
                );
            }
        }

        let sources = HarnessSources {
            baseline_src: self.settings.reference_url.clone(),
            candidate_src: format!("/dist/{}", self.settings.library_file),
        };
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let repeats = self.settings.effective_repeats();
        let run_baseline_live = self.settings.mode != ComparisonMode::SingleBaselineFile;

        let mut baseline_series = BTreeMap::new();
        let mut candidate_series = BTreeMap::new();
        for entry in &entries {
            discovery::ensure_harness_pages(entry, &sources)?;

            if run_baseline_live {
                let url = page_url(server, entry, Variant::Baseline);
                let metric = sampling::sample(
                    factory,
                    &entry.name,
                    Variant::Baseline,
                    &url,
                    repeats,
                    timeout,
                )?;
                baseline_series.insert(entry.name.clone(), metric);
            }

            let url = page_url(server, entry, Variant::Candidate);
            let metric = sampling::sample(
                factory,
                &entry.name,
                Variant::Candidate,
                &url,
                repeats,
                timeout,
            )?;
            candidate_series.insert(entry.name.clone(), metric);
        }

        if !run_baseline_live {
            baseline_series = self.load_stored_baseline()?;
        }

        let policy = TolerancePolicy {
            kind: self.settings.tolerance,
            threshold_percent: self.settings.threshold_percent,
        };
        let report = compare(&baseline_series, &candidate_series, policy);
        let rendered = render(&report);
        let output_file = self.write_results(&entries, &candidate_series)?;
        let posted = match sink {
            Some(sink) => self.publish(sink, &rendered),
            None => self.post_report(&rendered),
        };

        info!(
            scenarios = report.rows.len(),
            regression = report.overall_regression,
            "comparison complete"
        );
        Ok(RunOutcome {
            report,
            rendered,
            posted,
            output_file,
        })
    }

    fn load_stored_baseline(&self) -> Result<BTreeMap<String, AggregatedMetric>> {
        let Some(path) = &self.settings.baseline_file else {
            debug!("no baseline file configured; comparison skipped");
            return Ok(BTreeMap::new());
        };
        if !path.exists() {
            info!(path = %path.display(), "baseline file missing; comparison skipped");
            return Ok(BTreeMap::new());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Unable to read baseline file {}", path.display()))?;
        let records: Vec<BaselineRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed baseline file {}", path.display()))?;
        let mut series = BTreeMap::new();
        for record in records {
            let fps = record.fps.unwrap_or(f64::NAN);
            series.insert(
                record.name.clone(),
                AggregatedMetric::from_samples(record.name, Variant::Baseline, vec![fps]),
            );
        }
        info!(path = %path.display(), scenarios = series.len(), "loaded stored baseline");
        Ok(series)
    }

    fn write_results(
        &self,
        entries: &[ScenarioEntry],
        candidate_series: &BTreeMap<String, AggregatedMetric>,
    ) -> Result<Option<PathBuf>> {
        let Some(path) = &self.settings.output_file else {
            return Ok(None);
        };

        let results: Vec<StoredResult> = entries
            .iter()
            .filter_map(|entry| candidate_series.get(&entry.name))
            .map(|metric| StoredResult {
                name: metric.scenario.clone(),
                variant: metric.variant,
                fps: metric.mean,
                samples: metric.samples.clone(),
            })
            .collect();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create results directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(&results)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        info!(path = %path.display(), "wrote raw candidate results");
        Ok(Some(path.clone()))
    }

    /// Build the configured GitHub sink and publish through it.
    fn post_report(&self, body: &str) -> Option<PostAction> {
        let sink_settings = &self.settings.sink;
        let (Some(repo), Some(pr_number)) = (&sink_settings.repo, sink_settings.pr_number) else {
            debug!("comment sink not configured; skipping post");
            return None;
        };
        let Ok(token) = std::env::var(&sink_settings.token_env) else {
            info!(var = %sink_settings.token_env, "sink token not set; skipping post");
            return None;
        };

        match GithubCommentSink::new(repo.clone(), pr_number, token) {
            Ok(sink) => self.publish(&sink, body),
            Err(err) => {
                warn!(error = %err, "failed to build comment sink");
                None
            }
        }
    }

    /// Publish the rendered report to the review thread. Fail-soft: the sink
    /// never changes the invocation's pass/fail outcome.
    fn publish<S: CommentSink>(&self, sink: &S, body: &str) -> Option<PostAction> {
        match post_or_update(sink, REPORT_MARKER, body) {
            Ok(action) => {
                info!(action = ?action, "published report");
                Some(action)
            }
            Err(err) => {
                warn!(error = %err, "failed to publish report to comment sink");
                None
            }
        }
    }
}

fn page_url(server: &StaticServer, entry: &ScenarioEntry, variant: Variant) -> String {
    format!(
        "{}/bench/{}/{}",
        server.base_url(),
        entry.name,
        variant.harness_file_name()
    )
}
