use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use loadcheck_core::RunSummary;
use serde::Serialize;

use super::json::{JsonMetric, build_metrics};

/// End-of-test document in the shape of a k6 `handleSummary` export.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryExport {
    state: ExportState,
    metrics: BTreeMap<String, ExportMetric>,
    root_group: ExportGroup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportState {
    test_run_duration_ms: f64,
    stopped: bool,
    verdict: String,
}

#[derive(Debug, Serialize)]
struct ExportMetric {
    #[serde(flatten)]
    metric: JsonMetric,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    thresholds: BTreeMap<String, ExportThreshold>,
}

#[derive(Debug, Serialize)]
struct ExportThreshold {
    ok: bool,
    status: String,
}

#[derive(Debug, Default, Serialize)]
struct ExportGroup {
    name: String,
    path: String,
    groups: Vec<ExportGroup>,
    checks: Vec<ExportCheck>,
}

#[derive(Debug, Serialize)]
struct ExportCheck {
    name: String,
    path: String,
    passes: u64,
    fails: u64,
}

impl ExportGroup {
    /// Walks `segments` down from this group, creating groups on the way.
    fn descend(&mut self, segments: &[String]) -> &mut ExportGroup {
        let Some((first, rest)) = segments.split_first() else {
            return self;
        };
        let idx = match self.groups.iter().position(|g| g.name == *first) {
            Some(idx) => idx,
            None => {
                self.groups.push(ExportGroup {
                    name: first.clone(),
                    path: format!("{}::{first}", self.path),
                    ..ExportGroup::default()
                });
                self.groups.len() - 1
            }
        };
        self.groups[idx].descend(rest)
    }
}

fn build_export(summary: &RunSummary) -> SummaryExport {
    let mut metrics: BTreeMap<String, ExportMetric> = build_metrics(summary)
        .into_iter()
        .map(|(name, metric)| {
            (
                name,
                ExportMetric {
                    metric,
                    thresholds: BTreeMap::new(),
                },
            )
        })
        .collect();
    // A threshold on a metric that was never recorded still has to show up.
    for t in &summary.thresholds {
        metrics
            .entry(t.metric.clone())
            .or_insert_with(|| ExportMetric {
                metric: JsonMetric {
                    kind: "absent".to_string(),
                    values: BTreeMap::new(),
                },
                thresholds: BTreeMap::new(),
            })
            .thresholds
            .insert(
                t.expression.clone(),
                ExportThreshold {
                    ok: t.passed(),
                    status: t.status.to_string(),
                },
            );
    }

    let mut tallies: BTreeMap<(&[String], &str), (u64, u64)> = BTreeMap::new();
    for r in &summary.check_results {
        let (passes, fails) = tallies
            .entry((r.groups.as_slice(), r.name.as_str()))
            .or_default();
        if r.passed {
            *passes += 1;
        } else {
            *fails += 1;
        }
    }

    let mut root = ExportGroup::default();
    for ((groups, name), (passes, fails)) in tallies {
        let group = root.descend(groups);
        group.checks.push(ExportCheck {
            name: name.to_string(),
            path: format!("{}::{name}", group.path),
            passes,
            fails,
        });
    }

    SummaryExport {
        state: ExportState {
            test_run_duration_ms: summary.duration.as_secs_f64() * 1000.0,
            stopped: summary.stopped,
            verdict: summary.verdict.to_string(),
        },
        metrics,
        root_group: root,
    }
}

pub(crate) async fn write_summary_export(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let doc = build_export(summary);
    let bytes = serde_json::to_vec_pretty(&doc).context("failed to serialize summary export")?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write summary export: {}", path.display()))?;

    Ok(())
}
