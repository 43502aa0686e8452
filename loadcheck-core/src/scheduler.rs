use std::sync::Arc;
use std::time::{Duration, Instant};

use loadcheck_metrics::Registry;
use tokio::time::MissedTickBehavior;

use crate::check::IterationId;
use crate::config::{RunConfig, StartMode};
use crate::error::Result;
use crate::gate::IterationGate;
use crate::iteration::{IterationContext, RunContext, run_iteration};
use crate::progress::{ProgressFn, ProgressTracker};
use crate::summary::RunSummary;
use crate::thresholds_eval::evaluate_thresholds;
use crate::transport::{Scenario, Transport};
use crate::vu::{ActiveVuGuard, StartSignal, StopHandle, StopSignal, VuLifecycle, VuState};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Drives a fixed pool of virtual users over one scenario.
pub struct Scheduler {
    config: Arc<RunConfig>,
    scenario: Arc<dyn Scenario>,
    transport: Arc<dyn Transport>,
    stop: Arc<StopSignal>,
    progress: Option<ProgressFn>,
}

struct VuTask {
    vu: u64,
    config: Arc<RunConfig>,
    scenario: Arc<dyn Scenario>,
    run: Arc<RunContext>,
    gate: Arc<IterationGate>,
    start: Arc<StartSignal>,
    stop: Arc<StopSignal>,
}

impl Scheduler {
    pub fn new(config: RunConfig, scenario: Arc<dyn Scenario>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            scenario,
            transport,
            stop: Arc::new(StopSignal::new()),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    /// Runs until the budget is spent, the duration elapses or a stop is requested, then
    /// evaluates thresholds and builds the summary.
    pub async fn run(self) -> Result<RunSummary> {
        self.config.validate()?;
        let cfg = self.config.clone();

        let registry = Arc::new(Registry::new(cfg.trend_mode));
        let run = Arc::new(RunContext::new(
            registry.clone(),
            self.transport.clone(),
            cfg.request_timeout,
        )?);

        if let Some(iterations) = cfg.iterations
            && iterations < cfg.vus
        {
            tracing::warn!(
                vus = cfg.vus,
                iterations,
                "more virtual users than iterations; the extra ones will stop without running"
            );
        }

        let gate = Arc::new(IterationGate::new(cfg.iterations, cfg.duration));
        let start = Arc::new(StartSignal::new());

        let mut handles = Vec::with_capacity(usize::try_from(cfg.vus).unwrap_or(0));
        for vu in 1..=cfg.vus {
            let task = VuTask {
                vu,
                config: cfg.clone(),
                scenario: self.scenario.clone(),
                run: run.clone(),
                gate: gate.clone(),
                start: start.clone(),
                stop: self.stop.clone(),
            };
            handles.push(tokio::spawn(task.run()));
        }

        let started = Instant::now();
        gate.start_at(started);
        tracing::info!(
            vus = cfg.vus,
            iterations = ?cfg.iterations,
            duration = ?cfg.duration,
            "run started"
        );
        start.start();

        let progress_task = self.progress.clone().map(|progress| {
            let run = run.clone();
            tokio::spawn(async move {
                let mut tracker = ProgressTracker::new();
                let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    progress(tracker.update(&run.metrics, started.elapsed()));
                }
            })
        });

        let mut first_error = None;
        for handle in handles {
            let res = match handle.await {
                Ok(res) => res,
                Err(err) => Err(err.into()),
            };
            if let Err(err) = res {
                tracing::error!(error = %err, "virtual user failed");
                self.stop.stop();
                first_error.get_or_insert(err);
            }
        }
        if let Some(task) = progress_task {
            task.abort();
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let duration = started.elapsed();
        let stopped = self.stop.is_stopped();
        tracing::info!(?duration, stopped, "run finished");

        // Every virtual user has stopped: the registry no longer changes.
        let snapshot = registry.snapshot();
        let thresholds = evaluate_thresholds(&cfg.thresholds, &snapshot);
        let log = run.check_log();

        Ok(RunSummary::build(
            snapshot,
            log.results(),
            log.tallies(),
            thresholds,
            duration,
            stopped,
        ))
    }
}

impl VuTask {
    async fn run(self) -> Result<()> {
        let mut lifecycle = VuLifecycle::new(self.vu);
        self.start.wait().await;

        if let StartMode::Staggered(interval) = self.config.start {
            let delay = interval.saturating_mul(u32::try_from(self.vu - 1).unwrap_or(u32::MAX));
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.stop.stopped() => {}
                    _ = self.gate.deadline_reached() => {}
                }
            }
        }

        if self.stop.is_stopped() || self.gate.is_exhausted() {
            return lifecycle.transition(VuState::Stopped);
        }

        lifecycle.transition(VuState::Running)?;
        let _active = ActiveVuGuard::enter(self.run.metrics.vus.clone());

        let mut vu_iteration = 0u64;
        while !self.stop.is_stopped() {
            let Some(global) = self.gate.next() else {
                break;
            };

            let ctx = IterationContext::new(
                IterationId {
                    vu: self.vu,
                    vu_iteration,
                    global,
                },
                self.run.clone(),
            );
            run_iteration(self.scenario.as_ref(), &ctx).await;
            vu_iteration += 1;

            if self.gate.is_exhausted() {
                break;
            }
            if let Some(pause) = self.config.pause.sample() {
                lifecycle.transition(VuState::Paused)?;
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = self.stop.stopped() => {}
                    _ = self.gate.deadline_reached() => {}
                }
                lifecycle.transition(VuState::Running)?;
            }
        }

        tracing::debug!(vu = self.vu, iterations = vu_iteration, "virtual user stopped");
        lifecycle.transition(VuState::Stopped)
    }
}
