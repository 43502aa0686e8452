use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::FutureExt as _;
use loadcheck_http::{HttpRequest, HttpResponse};
use loadcheck_metrics::{MetricKind, Registry};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::builtin_metrics::{BuiltinMetrics, RequestSample};
use crate::check::{CheckEvaluator, CheckLog, CheckOutcome, IterationId, panic_message};
use crate::transport::{Scenario, Transport, TransportError};

/// State shared by every iteration of a run.
pub struct RunContext {
    pub(crate) registry: Arc<Registry>,
    pub(crate) metrics: BuiltinMetrics,
    pub(crate) checks: CheckEvaluator,
    transport: Arc<dyn Transport>,
    request_timeout: Option<Duration>,
}

impl RunContext {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        request_timeout: Option<Duration>,
    ) -> loadcheck_metrics::Result<Self> {
        let metrics = BuiltinMetrics::register(&registry)?;
        let checks = CheckEvaluator::new(registry.clone(), Arc::new(CheckLog::default()))?;
        Ok(Self {
            registry,
            metrics,
            checks,
            transport,
            request_timeout,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn check_log(&self) -> &Arc<CheckLog> {
        self.checks.log()
    }
}

/// Result of one request as seen by the scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub method: http::Method,
    pub url: String,
    /// 0 when no response was received.
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub elapsed: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error: Option<TransportError>,
}

impl RequestOutcome {
    fn from_response(method: http::Method, url: String, elapsed: Duration, res: HttpResponse) -> Self {
        Self {
            method,
            url,
            status: res.status,
            headers: res.headers,
            body: res.body,
            elapsed,
            bytes_sent: res.bytes_sent,
            bytes_received: res.bytes_received,
            error: None,
        }
    }

    fn from_error(method: http::Method, url: String, elapsed: Duration, err: TransportError) -> Self {
        Self {
            method,
            url,
            status: 0,
            headers: Vec::new(),
            body: Bytes::new(),
            elapsed,
            bytes_sent: 0,
            bytes_received: 0,
            error: Some(err),
        }
    }

    /// A response arrived with a status in 200..=399.
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && (200..=399).contains(&self.status)
    }

    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Per-iteration handle given to [`Scenario::run`].
pub struct IterationContext {
    id: IterationId,
    run: Arc<RunContext>,
    groups: Mutex<SmallVec<[String; 4]>>,
}

impl IterationContext {
    pub fn new(id: IterationId, run: Arc<RunContext>) -> Self {
        Self {
            id,
            run,
            groups: Mutex::new(SmallVec::new()),
        }
    }

    pub fn id(&self) -> IterationId {
        self.id
    }

    /// Names of the groups currently entered, outermost first.
    pub fn groups(&self) -> Vec<String> {
        self.groups.lock().to_vec()
    }

    /// Sends `req` through the run's transport and records the request metrics.
    ///
    /// Transport failures do not error: they come back as an outcome with `error` set.
    pub async fn request(&self, mut req: HttpRequest) -> RequestOutcome {
        if req.timeout.is_none() {
            req.timeout = self.run.request_timeout;
        }
        let method = req.method.clone();
        let url = req.url.clone();

        let started = Instant::now();
        let res = self.run.transport.send(req).await;
        let elapsed = started.elapsed();

        let outcome = match res {
            Ok(res) => RequestOutcome::from_response(method, url, elapsed, res),
            Err(err) => {
                tracing::debug!(vu = self.id.vu, url = %url, error = %err, "request failed");
                RequestOutcome::from_error(method, url, elapsed, err)
            }
        };

        self.run.metrics.record_request(RequestSample {
            elapsed,
            failed: !outcome.is_ok(),
            bytes_sent: outcome.bytes_sent,
            bytes_received: outcome.bytes_received,
        });
        outcome
    }

    /// Evaluates one named check against `subject` inside the current group.
    pub fn check<S, P, O>(&self, name: &str, subject: &S, predicate: P) -> bool
    where
        S: ?Sized,
        P: FnOnce(&S) -> O,
        O: CheckOutcome,
    {
        self.run
            .checks
            .evaluate(name, &self.groups(), self.id, predicate, subject)
            .passed
    }

    /// Evaluates every check (no short-circuit) and returns whether all passed.
    pub fn check_all<S: ?Sized>(&self, subject: &S, checks: &[(&str, &dyn Fn(&S) -> bool)]) -> bool {
        let groups = self.groups();
        let mut all = true;
        for (name, predicate) in checks {
            all &= self
                .run
                .checks
                .evaluate(name, &groups, self.id, |s: &S| predicate(s), subject)
                .passed;
        }
        all
    }

    /// Enters group `name` until the returned guard drops.
    pub fn group(&self, name: &str) -> GroupGuard<'_> {
        self.groups.lock().push(name.to_string());
        GroupGuard {
            ctx: self,
            started: Instant::now(),
        }
    }

    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Records a custom metric observation.
    pub fn add_metric(&self, name: &str, kind: MetricKind, value: f64) -> loadcheck_metrics::Result<()> {
        self.run.registry.record(name, kind, value)
    }
}

#[must_use = "the group ends when the guard is dropped"]
pub struct GroupGuard<'a> {
    ctx: &'a IterationContext,
    started: Instant,
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        self.ctx.groups.lock().pop();
        self.ctx
            .run
            .metrics
            .group_duration
            .observe_duration(self.started.elapsed());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed,
    Failed(String),
    Panicked(String),
}

impl IterationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, IterationOutcome::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationResult {
    pub id: IterationId,
    pub duration: Duration,
    pub outcome: IterationOutcome,
}

/// Runs one iteration. Scenario errors and panics end only this iteration.
pub async fn run_iteration(scenario: &dyn Scenario, ctx: &IterationContext) -> IterationResult {
    let started = Instant::now();
    let outcome = match AssertUnwindSafe(scenario.run(ctx)).catch_unwind().await {
        Ok(Ok(())) => IterationOutcome::Completed,
        Ok(Err(err)) => {
            let msg = format!("{err:#}");
            tracing::warn!(
                vu = ctx.id.vu,
                iteration = ctx.id.vu_iteration,
                global = ctx.id.global,
                error = %msg,
                "iteration failed"
            );
            IterationOutcome::Failed(msg)
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::warn!(
                vu = ctx.id.vu,
                iteration = ctx.id.vu_iteration,
                global = ctx.id.global,
                panic = %msg,
                "iteration panicked"
            );
            IterationOutcome::Panicked(msg)
        }
    };
    let duration = started.elapsed();

    ctx.run
        .metrics
        .record_iteration(duration, !outcome.is_completed());

    IterationResult {
        id: ctx.id,
        duration,
        outcome,
    }
}
