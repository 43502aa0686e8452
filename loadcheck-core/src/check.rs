use std::collections::BTreeMap;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;

use loadcheck_metrics::{MetricKind, Rate, Registry};
use parking_lot::Mutex;

/// Identifies one iteration of one virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IterationId {
    /// 1-based virtual user id.
    pub vu: u64,
    /// 0-based iteration counter of this virtual user.
    pub vu_iteration: u64,
    /// 0-based run-wide iteration index.
    pub global: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    /// Enclosing group names, outermost first.
    pub groups: Vec<String>,
    pub passed: bool,
    pub timestamp: SystemTime,
    pub iteration: IterationId,
}

impl CheckResult {
    /// `/`-joined group names, empty outside any group.
    pub fn group_path(&self) -> String {
        self.groups.join("/")
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(&self.group_path(), &self.name)
    }
}

pub fn qualified_name(group_path: &str, name: &str) -> String {
    if group_path.is_empty() {
        name.to_string()
    } else {
        format!("{group_path}/{name}")
    }
}

/// What a check predicate may return. `Err` counts as a failed check.
pub trait CheckOutcome {
    fn into_outcome(self) -> Result<bool, String>;
}

impl CheckOutcome for bool {
    fn into_outcome(self) -> Result<bool, String> {
        Ok(self)
    }
}

impl<E: Display> CheckOutcome for Result<bool, E> {
    fn into_outcome(self) -> Result<bool, String> {
        self.map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckTally {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Append-only log of every check result in the run.
#[derive(Debug, Default)]
pub struct CheckLog {
    results: Mutex<Vec<CheckResult>>,
}

impl CheckLog {
    fn push(&self, result: CheckResult) {
        self.results.lock().push(result);
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn results(&self) -> Vec<CheckResult> {
        self.results.lock().clone()
    }

    /// Pass/fail counts per qualified check name, sorted by name.
    pub fn tallies(&self) -> Vec<CheckTally> {
        let mut by_name: BTreeMap<String, CheckTally> = BTreeMap::new();
        for r in self.results.lock().iter() {
            let name = r.qualified_name();
            let tally = by_name.entry(name.clone()).or_insert_with(|| CheckTally {
                name,
                ..CheckTally::default()
            });
            if r.passed {
                tally.passes += 1;
            } else {
                tally.fails += 1;
            }
        }
        by_name.into_values().collect()
    }
}

/// Runs named predicates and records their results. Never fails and never panics.
#[derive(Debug, Clone)]
pub struct CheckEvaluator {
    registry: Arc<Registry>,
    log: Arc<CheckLog>,
    checks: Arc<Rate>,
}

impl CheckEvaluator {
    pub fn new(registry: Arc<Registry>, log: Arc<CheckLog>) -> loadcheck_metrics::Result<Self> {
        let checks = registry.rate(crate::builtin_metrics::CHECKS)?;
        Ok(Self {
            registry,
            log,
            checks,
        })
    }

    pub fn log(&self) -> &Arc<CheckLog> {
        &self.log
    }

    pub fn evaluate<S, P, O>(
        &self,
        name: &str,
        groups: &[String],
        iteration: IterationId,
        predicate: P,
        subject: &S,
    ) -> CheckResult
    where
        S: ?Sized,
        P: FnOnce(&S) -> O,
        O: CheckOutcome,
    {
        let passed = match std::panic::catch_unwind(AssertUnwindSafe(|| predicate(subject))) {
            Ok(outcome) => match outcome.into_outcome() {
                Ok(passed) => passed,
                Err(error) => {
                    tracing::debug!(check = name, %error, "check predicate returned an error");
                    false
                }
            },
            Err(payload) => {
                tracing::debug!(
                    check = name,
                    panic = panic_message(payload.as_ref()),
                    "check predicate panicked"
                );
                false
            }
        };

        let result = CheckResult {
            name: name.to_string(),
            groups: groups.to_vec(),
            passed,
            timestamp: SystemTime::now(),
            iteration,
        };

        // A check whose name collides with another metric kind is still logged and counted
        // in `checks`; the conflict shows up in the summary.
        let qualified = result.qualified_name();
        if qualified == crate::builtin_metrics::CHECKS {
            tracing::debug!(check = name, "check shares the aggregate checks metric name");
        } else {
            let _ = self.registry.record(
                &qualified,
                MetricKind::Rate,
                if passed { 1.0 } else { 0.0 },
            );
        }
        self.checks.add(passed);
        self.log.push(result.clone());
        result
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
