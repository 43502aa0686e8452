use loadcheck_metrics::{MetricValue, MetricsSnapshot};

use crate::thresholds::{ThresholdAgg, ThresholdSet, parse_threshold_expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdStatus {
    Passed,
    Failed,
    /// The metric was never recorded, even if it was registered.
    MetricAbsent,
    /// The aggregation is not defined for the metric's kind.
    Unsupported,
    /// The expression does not parse.
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
}

impl ThresholdResult {
    pub fn passed(&self) -> bool {
        self.status == ThresholdStatus::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn from_results(results: &[ThresholdResult]) -> Self {
        if results.iter().all(ThresholdResult::passed) {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        self == Verdict::Pass
    }
}

/// Evaluates every expression once against the final snapshot.
///
/// A metric that saw a kind conflict fails all of its thresholds.
pub fn evaluate_thresholds(sets: &[ThresholdSet], snapshot: &MetricsSnapshot) -> Vec<ThresholdResult> {
    let mut out = Vec::new();

    for set in sets {
        let metric = snapshot
            .get(&set.metric)
            .filter(|m| m.is_observed());
        let conflicted = snapshot.has_conflict(&set.metric);

        for raw in &set.expressions {
            let (observed, status) = match parse_threshold_expr(raw) {
                Err(reason) => {
                    tracing::warn!(metric = %set.metric, expression = %raw, %reason, "invalid threshold");
                    (None, ThresholdStatus::Invalid)
                }
                Ok(expr) => match metric {
                    None => (None, ThresholdStatus::MetricAbsent),
                    Some(m) => match observed_value(&m.value, expr.agg) {
                        None => (None, ThresholdStatus::Unsupported),
                        Some(v) if conflicted => (Some(v), ThresholdStatus::Failed),
                        Some(v) if expr.op.compare(v, expr.value) => {
                            (Some(v), ThresholdStatus::Passed)
                        }
                        Some(v) => (Some(v), ThresholdStatus::Failed),
                    },
                },
            };

            out.push(ThresholdResult {
                metric: set.metric.clone(),
                expression: raw.clone(),
                observed,
                status,
            });
        }
    }

    out
}

fn observed_value(value: &MetricValue, agg: ThresholdAgg) -> Option<f64> {
    match (value, agg) {
        (MetricValue::Trend(t), ThresholdAgg::Avg) => t.avg(),
        (MetricValue::Trend(t), ThresholdAgg::Min) => t.min(),
        (MetricValue::Trend(t), ThresholdAgg::Max) => t.max(),
        (MetricValue::Trend(t), ThresholdAgg::Med) => t.med(),
        (MetricValue::Trend(t), ThresholdAgg::Count) => Some(t.count() as f64),
        (MetricValue::Trend(t), ThresholdAgg::P(p)) => t.percentile(p),

        (MetricValue::Counter(v), ThresholdAgg::Count | ThresholdAgg::Value) => Some(*v),

        (MetricValue::Rate(r), ThresholdAgg::Rate) => Some(r.rate()),
        (MetricValue::Rate(r), ThresholdAgg::Count) => Some(r.total as f64),

        (MetricValue::Gauge { value, .. }, ThresholdAgg::Value) => Some(*value as f64),
        (MetricValue::Gauge { max, .. }, ThresholdAgg::Max) => Some(*max as f64),

        (_, _) => None,
    }
}
