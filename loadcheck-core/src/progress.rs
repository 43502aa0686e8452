use std::sync::Arc;
use std::time::Duration;

use crate::builtin_metrics::BuiltinMetrics;

/// Live counters reported about once per second while a run is in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// 1-based.
    pub tick: u64,
    pub elapsed: Duration,
    pub iterations: u64,
    pub active_vus: i64,
    pub requests: u64,
    pub failed_requests: u64,
    pub checks_failed: u64,
    /// Requests per second since the previous tick.
    pub rps_now: f64,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

pub(crate) struct ProgressTracker {
    tick: u64,
    last_requests: u64,
    last_elapsed: Duration,
}

impl ProgressTracker {
    pub(crate) fn new() -> Self {
        Self {
            tick: 0,
            last_requests: 0,
            last_elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn update(&mut self, metrics: &BuiltinMetrics, elapsed: Duration) -> ProgressUpdate {
        self.tick += 1;
        let requests = metrics.http_reqs.value() as u64;
        let window = elapsed.saturating_sub(self.last_elapsed).as_secs_f64();
        let rps_now = if window > 0.0 {
            requests.saturating_sub(self.last_requests) as f64 / window
        } else {
            0.0
        };
        self.last_requests = requests;
        self.last_elapsed = elapsed;

        ProgressUpdate {
            tick: self.tick,
            elapsed,
            iterations: metrics.iterations.value() as u64,
            active_vus: metrics.vus.value(),
            requests,
            failed_requests: metrics.http_req_failed.value().hits,
            checks_failed: metrics.checks.value().misses(),
            rps_now,
        }
    }
}
