use std::sync::Arc;
use std::time::Duration;

use loadcheck_metrics::{Counter, Gauge, Rate, Registry, Result, Trend};

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATION_FAILED: &str = "iteration_failed";
pub const GROUP_DURATION: &str = "group_duration";
pub const CHECKS: &str = "checks";
pub const VUS: &str = "vus";

/// Handles to the metrics the engine itself records, registered before the first iteration.
#[derive(Debug, Clone)]
pub struct BuiltinMetrics {
    pub http_reqs: Arc<Counter>,
    /// Milliseconds.
    pub http_req_duration: Arc<Trend>,
    pub http_req_failed: Arc<Rate>,
    pub data_sent: Arc<Counter>,
    pub data_received: Arc<Counter>,
    pub iterations: Arc<Counter>,
    /// Milliseconds.
    pub iteration_duration: Arc<Trend>,
    pub iteration_failed: Arc<Rate>,
    /// Milliseconds.
    pub group_duration: Arc<Trend>,
    pub checks: Arc<Rate>,
    pub vus: Arc<Gauge>,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestSample {
    pub elapsed: Duration,
    pub failed: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl BuiltinMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        Ok(Self {
            http_reqs: registry.counter(HTTP_REQS)?,
            http_req_duration: registry.trend(HTTP_REQ_DURATION)?,
            http_req_failed: registry.rate(HTTP_REQ_FAILED)?,
            data_sent: registry.counter(DATA_SENT)?,
            data_received: registry.counter(DATA_RECEIVED)?,
            iterations: registry.counter(ITERATIONS)?,
            iteration_duration: registry.trend(ITERATION_DURATION)?,
            iteration_failed: registry.rate(ITERATION_FAILED)?,
            group_duration: registry.trend(GROUP_DURATION)?,
            checks: registry.rate(CHECKS)?,
            vus: registry.gauge(VUS)?,
        })
    }

    pub fn record_request(&self, sample: RequestSample) {
        self.http_reqs.increment(1);
        self.http_req_duration.observe_duration(sample.elapsed);
        self.http_req_failed.add(sample.failed);
        self.data_sent.increment(sample.bytes_sent);
        self.data_received.increment(sample.bytes_received);
    }

    pub fn record_iteration(&self, duration: Duration, failed: bool) {
        self.iteration_duration.observe_duration(duration);
        self.iteration_failed.add(failed);
        self.iterations.increment(1);
    }
}
