use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ToleranceKind;
use crate::sampling::AggregatedMetric;

/// Frame rate the FPS-scaled policy anchors its tolerance to.
pub const REFERENCE_FPS: f64 = 60.0;

/// Direction of the candidate's movement relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    None,
}

/// Tolerance the comparator applies when classifying a row.
#[derive(Debug, Clone, Copy)]
pub struct TolerancePolicy {
    pub kind: ToleranceKind,
    pub threshold_percent: f64,
}

impl TolerancePolicy {
    /// Percent slowdown allowed for a scenario with the given baseline mean.
    ///
    /// The fixed policy returns the threshold unchanged. The FPS-scaled policy
    /// widens it as the baseline drops below the reference frame rate, since a
    /// fixed percentage is a much smaller absolute-FPS budget at low frame
    /// rates. The floor of 1 on the denominator keeps near-zero baselines from
    /// blowing the tolerance up.
    pub fn allowed_for(&self, baseline_mean: f64) -> f64 {
        match self.kind {
            ToleranceKind::Fixed => self.threshold_percent,
            ToleranceKind::FpsScaled => {
                self.threshold_percent * (REFERENCE_FPS / baseline_mean.max(1.0))
            }
        }
    }
}

/// One scenario's comparison outcome. `diff_percent` is absent when either
/// side is absent, either mean is NaN (a malformed payload), or the baseline
/// mean is zero (no denominator to divide by); positive means the candidate is
/// slower than the baseline.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub scenario: String,
    pub baseline: Option<AggregatedMetric>,
    pub candidate: Option<AggregatedMetric>,
    pub diff_percent: Option<f64>,
    pub regressed: bool,
    pub trend: Trend,
}

/// Full comparison over both result sets, rows in sorted scenario order.
#[derive(Debug, Clone)]
pub struct RegressionReport {
    pub rows: Vec<ComparisonRow>,
    pub overall_regression: bool,
}

/// Join the baseline and candidate series by scenario name and classify each
/// row under the tolerance policy. Deterministic: the union of names is
/// iterated in sorted order.
///
/// A scenario present on only one side is reported but can never regress: a
/// new scenario has no baseline to fall behind, and a removed one is excluded
/// from regression scoring.
pub fn compare(
    baseline: &BTreeMap<String, AggregatedMetric>,
    candidate: &BTreeMap<String, AggregatedMetric>,
    policy: TolerancePolicy,
) -> RegressionReport {
    let mut names: Vec<&String> = baseline.keys().chain(candidate.keys()).collect();
    names.sort();
    names.dedup();

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let base = baseline.get(name);
        let cand = candidate.get(name);

        let diff_percent = match (base, cand) {
            (Some(b), Some(c)) if b.mean.is_finite() && c.mean.is_finite() && b.mean != 0.0 => {
                Some((b.mean - c.mean) / b.mean * 100.0)
            }
            _ => None,
        };

        let regressed = match (diff_percent, base) {
            (Some(diff), Some(b)) => diff > policy.allowed_for(b.mean),
            _ => false,
        };

        let trend = match diff_percent {
            Some(diff) if diff > 0.0 => Trend::Down,
            Some(diff) if diff < 0.0 => Trend::Up,
            _ => Trend::None,
        };

        debug!(
            scenario = %name,
            diff = ?diff_percent,
            regressed,
            "classified comparison row"
        );
        rows.push(ComparisonRow {
            scenario: name.clone(),
            baseline: base.cloned(),
            candidate: cand.cloned(),
            diff_percent,
            regressed,
            trend,
        });
    }

    let overall_regression = rows.iter().any(|row| row.regressed);
    RegressionReport {
        rows,
        overall_regression,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::sampling::AggregatedMetric;

    fn series(pairs: &[(&str, f64)], variant: Variant) -> BTreeMap<String, AggregatedMetric> {
        pairs
            .iter()
            .map(|(name, fps)| {
                (
                    (*name).to_string(),
                    AggregatedMetric::from_samples(*name, variant, vec![*fps]),
                )
            })
            .collect()
    }

    fn fixed(threshold: f64) -> TolerancePolicy {
        TolerancePolicy {
            kind: ToleranceKind::Fixed,
            threshold_percent: threshold,
        }
    }

    #[test]
    fn slower_candidate_past_threshold_regresses() {
        let baseline = series(&[("cubes", 60.0)], Variant::Baseline);
        let candidate = series(&[("cubes", 54.0)], Variant::Candidate);
        let report = compare(&baseline, &candidate, fixed(5.0));

        let row = &report.rows[0];
        assert!((row.diff_percent.unwrap() - 10.0).abs() < 1e-9);
        assert!(row.regressed);
        assert_eq!(row.trend, Trend::Down);
        assert!(report.overall_regression);
    }

    #[test]
    fn fps_scaled_tolerance_widens_at_low_frame_rates() {
        let policy = TolerancePolicy {
            kind: ToleranceKind::FpsScaled,
            threshold_percent: 5.0,
        };
        // Baseline at 30 fps doubles the allowance to 10%.
        assert!((policy.allowed_for(30.0) - 10.0).abs() < 1e-9);

        let baseline = series(&[("cubes", 30.0)], Variant::Baseline);
        let within = series(&[("cubes", 27.6)], Variant::Candidate); // 8% slower
        let beyond = series(&[("cubes", 26.4)], Variant::Candidate); // 12% slower

        assert!(!compare(&baseline, &within, policy).overall_regression);
        assert!(compare(&baseline, &beyond, policy).overall_regression);
    }

    #[test]
    fn fps_scaled_denominator_is_floored() {
        let policy = TolerancePolicy {
            kind: ToleranceKind::FpsScaled,
            threshold_percent: 5.0,
        };
        assert!((policy.allowed_for(0.2) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn one_sided_scenario_never_regresses() {
        let baseline = series(&[("old", 60.0)], Variant::Baseline);
        let candidate = series(&[("new", 60.0)], Variant::Candidate);
        let report = compare(&baseline, &candidate, fixed(5.0));

        assert_eq!(report.rows.len(), 2);
        for row in &report.rows {
            assert!(row.diff_percent.is_none());
            assert!(!row.regressed);
            assert_eq!(row.trend, Trend::None);
        }
        assert!(!report.overall_regression);
    }

    #[test]
    fn nan_series_is_incomparable_not_a_crash() {
        let baseline = series(&[("cubes", 60.0)], Variant::Baseline);
        let candidate = series(&[("cubes", f64::NAN)], Variant::Candidate);
        let report = compare(&baseline, &candidate, fixed(5.0));

        let row = &report.rows[0];
        assert!(row.diff_percent.is_none());
        assert!(!row.regressed);
        assert_eq!(row.trend, Trend::None);

        // A zero baseline mean has no denominator and must not produce -inf.
        let stalled = series(&[("cubes", 0.0)], Variant::Baseline);
        let candidate = series(&[("cubes", 54.0)], Variant::Candidate);
        let report = compare(&stalled, &candidate, fixed(5.0));

        let row = &report.rows[0];
        assert!(row.diff_percent.is_none());
        assert!(!row.regressed);
        assert_eq!(row.trend, Trend::None);
    }

    #[test]
    fn comparing_a_set_against_itself_is_clean() {
        let baseline = series(&[("a", 60.0), ("b", 31.4)], Variant::Baseline);
        let candidate = series(&[("a", 60.0), ("b", 31.4)], Variant::Candidate);
        let report = compare(&baseline, &candidate, fixed(5.0));

        for row in &report.rows {
            assert_eq!(row.diff_percent, Some(0.0));
            assert!(!row.regressed);
            assert_eq!(row.trend, Trend::None);
        }
        assert!(!report.overall_regression);
    }

    #[test]
    fn rows_are_sorted_by_scenario_name() {
        let baseline = series(&[("zebra", 60.0), ("alpha", 60.0)], Variant::Baseline);
        let candidate = series(&[("mid", 60.0)], Variant::Candidate);
        let report = compare(&baseline, &candidate, fixed(5.0));
        let names: Vec<&str> = report
            .rows
            .iter()
            .map(|row| row.scenario.as_str())
            .collect();
        assert_eq!(names, ["alpha", "mid", "zebra"]);
    }
}
