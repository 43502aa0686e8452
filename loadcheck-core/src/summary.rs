use std::time::Duration;

use loadcheck_metrics::{KindConflict, MetricValue, MetricsSnapshot};

use crate::builtin_metrics::{ITERATION_FAILED, ITERATIONS};
use crate::check::{CheckResult, CheckTally};
use crate::thresholds_eval::{ThresholdResult, Verdict};

/// Everything known about a finished run. Built once, after every virtual user stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub metrics: MetricsSnapshot,
    /// Per qualified check name, sorted by name.
    pub checks: Vec<CheckTally>,
    pub checks_passed: u64,
    pub checks_failed: u64,
    /// Every check result in the order it was recorded.
    pub check_results: Vec<CheckResult>,
    pub thresholds: Vec<ThresholdResult>,
    pub verdict: Verdict,
    pub iterations_completed: u64,
    pub iteration_errors: u64,
    pub kind_conflicts: Vec<KindConflict>,
    pub duration: Duration,
    /// The run was cut short by a stop request.
    pub stopped: bool,
}

impl RunSummary {
    pub(crate) fn build(
        metrics: MetricsSnapshot,
        check_results: Vec<CheckResult>,
        checks: Vec<CheckTally>,
        thresholds: Vec<ThresholdResult>,
        duration: Duration,
        stopped: bool,
    ) -> Self {
        let checks_passed = checks.iter().map(|c| c.passes).sum();
        let checks_failed = checks.iter().map(|c| c.fails).sum();

        let iterations_completed = match metrics.get(ITERATIONS).map(|m| &m.value) {
            Some(MetricValue::Counter(v)) => *v as u64,
            _ => 0,
        };
        let iteration_errors = metrics
            .get(ITERATION_FAILED)
            .and_then(|m| m.value.as_rate())
            .map_or(0, |r| r.hits);

        Self {
            verdict: Verdict::from_results(&thresholds),
            kind_conflicts: metrics.conflicts.clone(),
            metrics,
            checks,
            checks_passed,
            checks_failed,
            check_results,
            thresholds,
            iterations_completed,
            iteration_errors,
            duration,
            stopped,
        }
    }

    pub fn check(&self, qualified_name: &str) -> Option<&CheckTally> {
        self.checks.iter().find(|c| c.name == qualified_name)
    }
}
