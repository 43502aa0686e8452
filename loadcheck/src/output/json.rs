use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use loadcheck_core::{ProgressFn, ProgressUpdate, RunConfig, RunSummary};
use loadcheck_metrics::MetricValue;
use serde::Serialize;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario_path: &Path, _cfg: &RunConfig) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            if let Err(err) = emit_json_line(&line) {
                tracing::debug!(error = %err, "failed to write progress line");
            }
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        emit_json_line(&line)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub active_vus: i64,
    pub iterations: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub checks_failed: u64,
    pub requests_per_sec: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        active_vus: u.active_vus,
        iterations: u.iterations,
        total_requests: u.requests,
        failed_requests: u.failed_requests,
        checks_failed: u.checks_failed,
        requests_per_sec: u.rps_now,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub verdict: String,
    pub duration_secs: f64,
    pub stopped: bool,
    pub iterations: u64,
    pub iteration_errors: u64,
    pub checks: JsonChecks,
    pub thresholds: Vec<JsonThreshold>,
    pub metrics: BTreeMap<String, JsonMetric>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kind_conflicts: Vec<JsonKindConflict>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonChecks {
    pub passed: u64,
    pub failed: u64,
    pub by_name: Vec<JsonCheck>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub status: String,
    pub observed: Option<f64>,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JsonMetric {
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds for trends, bytes for `data_*`.
    pub values: BTreeMap<&'static str, f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonKindConflict {
    pub metric: String,
    pub registered: String,
    pub attempted: String,
    pub count: u64,
}

/// Aggregated values of one metric, keyed the way thresholds name them.
pub(crate) fn metric_values(value: &MetricValue, run: Duration) -> BTreeMap<&'static str, f64> {
    let mut values = BTreeMap::new();
    match value {
        MetricValue::Counter(v) => {
            values.insert("count", *v);
            values.insert("rate", *v / run.as_secs_f64().max(1e-9));
        }
        MetricValue::Gauge { value, max } => {
            values.insert("value", *value as f64);
            values.insert("max", *max as f64);
        }
        MetricValue::Rate(r) => {
            values.insert("rate", r.rate());
            values.insert("passes", r.hits as f64);
            values.insert("fails", r.misses() as f64);
        }
        MetricValue::Trend(t) => {
            let s = t.stats();
            values.insert("count", s.count as f64);
            for (key, v) in [
                ("avg", s.avg),
                ("min", s.min),
                ("med", s.med),
                ("max", s.max),
                ("p(90)", s.p90),
                ("p(95)", s.p95),
                ("p(99)", s.p99),
            ] {
                if let Some(v) = v {
                    values.insert(key, v);
                }
            }
        }
    }
    values
}

pub(crate) fn build_metrics(summary: &RunSummary) -> BTreeMap<String, JsonMetric> {
    summary
        .metrics
        .iter()
        .map(|m| {
            (
                m.name.clone(),
                JsonMetric {
                    kind: m.kind().to_string(),
                    values: metric_values(&m.value, summary.duration),
                },
            )
        })
        .collect()
}

fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        verdict: summary.verdict.to_string(),
        duration_secs: summary.duration.as_secs_f64(),
        stopped: summary.stopped,
        iterations: summary.iterations_completed,
        iteration_errors: summary.iteration_errors,
        checks: JsonChecks {
            passed: summary.checks_passed,
            failed: summary.checks_failed,
            by_name: summary
                .checks
                .iter()
                .map(|c| JsonCheck {
                    name: c.name.clone(),
                    passes: c.passes,
                    fails: c.fails,
                })
                .collect(),
        },
        thresholds: summary
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                status: t.status.to_string(),
                observed: t.observed,
                ok: t.passed(),
            })
            .collect(),
        metrics: build_metrics(summary),
        kind_conflicts: summary
            .kind_conflicts
            .iter()
            .map(|c| JsonKindConflict {
                metric: c.metric.clone(),
                registered: c.registered.to_string(),
                attempted: c.attempted.to_string(),
                count: c.count,
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) -> anyhow::Result<()> {
    write_json_line(&mut std::io::stdout().lock(), line)
}

fn write_json_line<W: Write, T: Serialize>(out: &mut W, line: &T) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, line).context("failed to write JSON line")?;
    writeln!(out).context("failed to write JSON line")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures;
    use serde_json::Value;

    #[test]
    fn progress_line_has_kind() {
        let line = build_progress_line(&ProgressUpdate {
            tick: 3,
            elapsed: Duration::from_millis(3000),
            iterations: 10,
            active_vus: 2,
            requests: 20,
            failed_requests: 1,
            checks_failed: 4,
            rps_now: 6.5,
        });

        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert_eq!(v["kind"], "progress");
        assert_eq!(v["activeVus"], 2);
        assert_eq!(v["totalRequests"], 20);
        assert_eq!(v["requestsPerSec"], 6.5);
    }

    #[test]
    fn summary_line_carries_verdict_checks_and_metrics() {
        let line = build_summary_line(&fixtures::summary());
        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v["kind"], "summary");
        assert_eq!(v["verdict"], "fail");
        assert_eq!(v["iterations"], 2);
        assert_eq!(v["checks"]["passed"], 3);
        assert_eq!(v["checks"]["byName"][1]["name"], "users/status is 201");
        assert_eq!(v["thresholds"][1]["ok"], false);
        assert_eq!(v["thresholds"][1]["status"], "failed");
        assert_eq!(v["metrics"]["http_req_duration"]["type"], "trend");
        assert_eq!(v["metrics"]["http_req_duration"]["values"]["avg"], 200.0);
        assert_eq!(v["metrics"]["checks"]["values"]["rate"], 0.75);
        assert_eq!(v["metrics"]["vus"]["values"]["max"], 1.0);
        assert_eq!(v["kindConflicts"][0]["metric"], "iterations");
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_are_returned() {
        let line = build_summary_line(&fixtures::summary());
        assert!(write_json_line(&mut ClosedPipe, &line).is_err());

        let mut buf = Vec::new();
        write_json_line(&mut buf, &line).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(buf.last(), Some(&b'\n'));
        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn counter_rate_is_per_second_of_run() {
        let values = metric_values(&MetricValue::Counter(10.0), Duration::from_secs(2));
        assert_eq!(values.get("count"), Some(&10.0));
        assert_eq!(values.get("rate"), Some(&5.0));
    }
}
