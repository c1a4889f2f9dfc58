use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Variant;
use crate::error::DiscoveryError;

/// File that marks a directory as a benchmark scenario.
pub const SCENARIO_ENTRY_FILE: &str = "scenario.js";

const HARNESS_TEMPLATE: &str = include_str!("../templates/harness.html");

/// One discovered benchmark scene. The name is the path relative to the
/// benchmark root, so two scenario directories can never share a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioEntry {
    pub name: String,
    pub directory: PathBuf,
}

/// Walk `root` and return every directory containing a scenario entry point,
/// in sorted (deterministic) order.
pub fn discover(root: &Path) -> Result<Vec<ScenarioEntry>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::RootMissing(root.display().to_string()));
    }

    let mut entries = Vec::new();
    collect_scenarios(root, root, &mut entries)?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    if entries.is_empty() {
        return Err(DiscoveryError::NoScenarios(root.display().to_string()));
    }

    info!(root = %root.display(), count = entries.len(), "discovered benchmark scenarios");
    Ok(entries)
}

fn collect_scenarios(
    root: &Path,
    dir: &Path,
    out: &mut Vec<ScenarioEntry>,
) -> Result<(), DiscoveryError> {
    let reader = fs::read_dir(dir).map_err(|source| DiscoveryError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    if dir.join(SCENARIO_ENTRY_FILE).is_file() {
        let relative = dir.strip_prefix(root).unwrap_or(dir);
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(ScenarioEntry {
            name,
            directory: dir.to_path_buf(),
        });
    }

    for entry in reader.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect_scenarios(root, &path, out)?;
        }
    }
    Ok(())
}

/// How a harness page write turned out. An existing page is never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessWriteAction {
    Created,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct HarnessWriteOutcome {
    pub path: PathBuf,
    pub variant: Variant,
    pub action: HarnessWriteAction,
}

/// Script sources the harness template is parameterized with, one per variant.
#[derive(Debug, Clone)]
pub struct HarnessSources {
    pub baseline_src: String,
    pub candidate_src: String,
}

impl HarnessSources {
    fn source_for(&self, variant: Variant) -> &str {
        match variant {
            Variant::Baseline => &self.baseline_src,
            Variant::Candidate => &self.candidate_src,
        }
    }
}

/// Materialize the per-variant harness pages for a scenario from the embedded
/// template. Idempotent: pages already on disk are left untouched.
pub fn ensure_harness_pages(
    entry: &ScenarioEntry,
    sources: &HarnessSources,
) -> Result<Vec<HarnessWriteOutcome>> {
    let mut outcomes = Vec::with_capacity(2);
    for variant in [Variant::Baseline, Variant::Candidate] {
        let path = entry.directory.join(variant.harness_file_name());
        let action = if path.exists() {
            HarnessWriteAction::Skipped
        } else {
            let rendered = HARNESS_TEMPLATE.replace("{{library_src}}", sources.source_for(variant));
            fs::write(&path, rendered).with_context(|| {
                format!("Failed to write harness page to {}", path.display())
            })?;
            debug!(scenario = %entry.name, variant = %variant, path = %path.display(), "wrote harness page");
            HarnessWriteAction::Created
        };
        outcomes.push(HarnessWriteOutcome {
            path,
            variant,
            action,
        });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_scenario(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("scenario directory");
        fs::write(dir.join(SCENARIO_ENTRY_FILE), "// scene").expect("entry point");
    }

    #[test]
    fn discovers_nested_scenarios_in_sorted_order() {
        let dir = tempdir().expect("temp directory");
        make_scenario(dir.path(), "zebra");
        make_scenario(dir.path(), "alpha/particles");
        make_scenario(dir.path(), "alpha/cubes");
        fs::create_dir_all(dir.path().join("not-a-scenario")).expect("plain directory");

        let entries = discover(dir.path()).expect("discovery");
        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["alpha/cubes", "alpha/particles", "zebra"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().expect("temp directory");
        let missing = dir.path().join("nope");
        assert!(matches!(
            discover(&missing),
            Err(DiscoveryError::RootMissing(_))
        ));
    }

    #[test]
    fn empty_root_yields_no_scenarios() {
        let dir = tempdir().expect("temp directory");
        assert!(matches!(
            discover(dir.path()),
            Err(DiscoveryError::NoScenarios(_))
        ));
    }

    #[test]
    fn harness_synthesis_is_idempotent() {
        let dir = tempdir().expect("temp directory");
        make_scenario(dir.path(), "cubes");
        let entry = ScenarioEntry {
            name: "cubes".into(),
            directory: dir.path().join("cubes"),
        };
        let sources = HarnessSources {
            baseline_src: "https://cdn.example/renderer.js".into(),
            candidate_src: "/dist/renderer.min.js".into(),
        };

        let first = ensure_harness_pages(&entry, &sources).expect("first synthesis");
        assert!(
            first
                .iter()
                .all(|outcome| outcome.action == HarnessWriteAction::Created)
        );

        let baseline_page =
            fs::read_to_string(entry.directory.join("baseline.html")).expect("baseline page");
        assert!(baseline_page.contains("https://cdn.example/renderer.js"));
        let candidate_page =
            fs::read_to_string(entry.directory.join("candidate.html")).expect("candidate page");
        assert!(candidate_page.contains("/dist/renderer.min.js"));

        // A second pass must not rewrite hand-edited pages.
        fs::write(entry.directory.join("candidate.html"), "custom").expect("hand edit");
        let second = ensure_harness_pages(&entry, &sources).expect("second synthesis");
        assert!(
            second
                .iter()
                .all(|outcome| outcome.action == HarnessWriteAction::Skipped)
        );
        let kept =
            fs::read_to_string(entry.directory.join("candidate.html")).expect("candidate page");
        assert_eq!(kept, "custom");
    }
}
