use crate::compare::{ComparisonRow, RegressionReport, Trend};

/// Stable marker embedded in every rendered report so a later invocation can
/// find and replace the previous comment instead of appending a duplicate.
pub const REPORT_MARKER: &str = "<!-- renderbench:report -->";

/// Render the comparison as Markdown. Pure and byte-deterministic: the same
/// report always yields the same text.
pub fn render(report: &RegressionReport) -> String {
    let mut out = String::new();
    out.push_str(REPORT_MARKER);
    out.push_str("\n## Rendering benchmarks\n\n");
    out.push_str("| Name | Metric | Baseline | Candidate | Change |\n");
    out.push_str("| --- | --- | --- | --- | --- |\n");
    for row in &report.rows {
        out.push_str(&render_row(row));
    }
    out.push('\n');
    if report.overall_regression {
        out.push_str("**Verdict:** performance regression detected ❌\n");
    } else {
        out.push_str("**Verdict:** no regressions detected ✅\n");
    }
    out
}

fn render_row(row: &ComparisonRow) -> String {
    let baseline = row
        .baseline
        .as_ref()
        .map(|metric| format_fps(metric.mean))
        .unwrap_or_else(|| "–".into());
    let candidate = row
        .candidate
        .as_ref()
        .map(|metric| format_fps(metric.mean))
        .unwrap_or_else(|| "–".into());
    let change = match row.diff_percent {
        Some(diff) => {
            let arrow = match row.trend {
                Trend::Down => "⬇ ",
                Trend::Up => "⬆ ",
                Trend::None => "",
            };
            if row.regressed {
                format!("{arrow}{diff:.2}% (regression)")
            } else {
                format!("{arrow}{diff:.2}%")
            }
        }
        None => "n/a".into(),
    };
    format!(
        "| {} | fps | {} | {} | {} |\n",
        row.scenario, baseline, candidate, change
    )
}

fn format_fps(mean: f64) -> String {
    if mean.is_finite() {
        format!("{mean:.2}")
    } else {
        "n/a".into()
    }
}
