use std::fmt::Write as _;

use loadcheck_core::{RunSummary, Verdict};
use loadcheck_metrics::{MetricValue, TrendSnapshot};

use super::format::*;

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    let stopped = if summary.stopped { " (stopped early)" } else { "" };
    writeln!(
        &mut out,
        "  duration: {}{stopped}",
        format_duration(summary.duration)
    )
    .ok();
    writeln!(
        &mut out,
        "  iterations: {} (failed {})",
        summary.iterations_completed, summary.iteration_errors
    )
    .ok();

    render_checks(summary, &mut out);
    render_metrics(summary, &mut out);
    render_thresholds(summary, &mut out);

    if !summary.kind_conflicts.is_empty() {
        out.push_str("\nmetric kind conflicts\n");
        for c in &summary.kind_conflicts {
            writeln!(
                &mut out,
                "  {}: registered as {}, recorded as {} ({}x)",
                c.metric, c.registered, c.attempted, c.count
            )
            .ok();
        }
    }

    let verdict = match summary.verdict {
        Verdict::Pass => "PASS",
        Verdict::Fail => "FAIL",
    };
    writeln!(&mut out, "\nverdict: {verdict}").ok();

    out
}

fn render_checks(summary: &RunSummary, out: &mut String) {
    let total = summary.checks_passed + summary.checks_failed;
    if total == 0 {
        return;
    }

    writeln!(
        out,
        "\nchecks: {}/{} passed ({})",
        summary.checks_passed,
        total,
        format_percent(summary.checks_passed as f64 / total as f64)
    )
    .ok();
    for c in &summary.checks {
        let mark = if c.fails == 0 { '✓' } else { '✗' };
        writeln!(out, "  {mark} {}: {} passed, {} failed", c.name, c.passes, c.fails).ok();
    }
}

fn render_metrics(summary: &RunSummary, out: &mut String) {
    if summary.metrics.metrics.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    let width = summary
        .metrics
        .iter()
        .map(|m| m.name.chars().count())
        .max()
        .unwrap_or(0);
    let secs = summary.duration.as_secs_f64().max(1e-9);

    for m in summary.metrics.iter() {
        let rendered = match &m.value {
            MetricValue::Counter(v) if m.name.starts_with("data_") => {
                format!(
                    "{} {}/s",
                    format_bytes(*v as u64),
                    format_bytes((*v / secs).round() as u64)
                )
            }
            MetricValue::Counter(v) => format!("{v} {}/s", format_rate(*v / secs)),
            MetricValue::Gauge { value, max } => format!("value={value} max={max}"),
            MetricValue::Rate(r) => format!(
                "{} {} out of {}",
                format_percent(r.rate()),
                r.hits,
                r.total
            ),
            MetricValue::Trend(t) => render_trend(t),
        };
        writeln!(out, "  {:.<width$}: {rendered}", m.name, width = width + 2).ok();
    }
}

fn render_trend(t: &TrendSnapshot) -> String {
    if t.is_empty() {
        return "n/a".to_string();
    }
    let s = t.stats();
    format!(
        "avg={} min={} med={} max={} p(90)={} p(95)={} (n={})",
        format_ms_opt(s.avg),
        format_ms_opt(s.min),
        format_ms_opt(s.med),
        format_ms_opt(s.max),
        format_ms_opt(s.p90),
        format_ms_opt(s.p95),
        s.count
    )
}

fn render_thresholds(summary: &RunSummary, out: &mut String) {
    if summary.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &summary.thresholds {
        let mark = if t.passed() { '✓' } else { '✗' };
        let observed = t
            .observed
            .map_or_else(|| "-".to_string(), |v| format!("{v}"));
        writeln!(
            out,
            "  {mark} {} {} (observed {observed}, {})",
            t.metric, t.expression, t.status
        )
        .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures;

    #[test]
    fn renders_every_section() {
        let out = render(&fixtures::summary());

        assert!(out.contains("iterations: 2 (failed 0)"), "{out}");
        assert!(out.contains("checks: 3/4 passed (75.00%)"), "{out}");
        assert!(out.contains("✓ users/has id: 2 passed, 0 failed"), "{out}");
        assert!(out.contains("✗ users/status is 201: 1 passed, 1 failed"), "{out}");
        assert!(out.contains("avg=200.00ms min=100.00ms"), "{out}");
        assert!(out.contains("value=0 max=1"), "{out}");
        assert!(out.contains("2.00KiB"), "{out}");
        assert!(out.contains("✓ http_req_duration p(95)<2000 (observed 290, passed)"), "{out}");
        assert!(out.contains("✗ checks rate==1 (observed 0.75, failed)"), "{out}");
        assert!(out.contains("iterations: registered as counter, recorded as trend (1x)"), "{out}");
        assert!(out.trim_end().ends_with("verdict: FAIL"), "{out}");
    }

    #[test]
    fn quiet_run_skips_empty_sections() {
        let mut summary = fixtures::summary();
        summary.checks.clear();
        summary.checks_passed = 0;
        summary.checks_failed = 0;
        summary.thresholds.clear();
        summary.kind_conflicts.clear();
        summary.verdict = Verdict::Pass;
        summary.stopped = true;

        let out = render(&summary);
        assert!(!out.contains("checks:"), "{out}");
        assert!(!out.contains("thresholds\n"), "{out}");
        assert!(out.contains("(stopped early)"), "{out}");
        assert!(out.trim_end().ends_with("verdict: PASS"), "{out}");
    }
}
