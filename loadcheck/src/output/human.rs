use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use loadcheck_core::{Pause, ProgressFn, RunConfig, RunSummary, StartMode};

mod format;
mod progress;
mod summary;

use format::{format_duration, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
    total: Arc<std::sync::OnceLock<Option<Duration>>>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
            total: Arc::new(std::sync::OnceLock::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario_path: &Path, cfg: &RunConfig) {
        let _ = self.total.set(cfg.duration);

        println!("scenario: {}", scenario_path.display());
        let mut line = format!("vus={}", cfg.vus);
        if let Some(iterations) = cfg.iterations {
            line.push_str(&format!(" iterations={iterations}"));
        }
        if let Some(duration) = cfg.duration {
            line.push_str(&format!(" duration={}", humantime::format_duration(duration)));
        }
        match cfg.pause {
            Pause::None => {}
            Pause::Fixed(d) => line.push_str(&format!(" pause={}", humantime::format_duration(d))),
            Pause::Random { min, max } => line.push_str(&format!(
                " pause={}..{}",
                humantime::format_duration(min),
                humantime::format_duration(max)
            )),
        }
        if let StartMode::Staggered(d) = cfg.start {
            line.push_str(&format!(" stagger={}", humantime::format_duration(d)));
        }
        println!("{line}");
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        let total = self.total.clone();

        Some(Arc::new(move |u| {
            let message = format!(
                "vus={} elapsed={} iters={} rps={} failed_reqs={} checks_failed={}",
                u.active_vus,
                format_duration(u.elapsed),
                u.iterations,
                format_rate(u.rps_now),
                u.failed_requests,
                u.checks_failed
            );
            progress.update(total.get().copied().flatten(), u.elapsed, message);
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));

        let failed: Vec<_> = summary.thresholds.iter().filter(|t| !t.passed()).collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                match t.observed {
                    Some(obs) => eprintln!(
                        "  {}: {} ({}, observed {obs})",
                        t.metric, t.expression, t.status
                    ),
                    None => eprintln!("  {}: {} ({})", t.metric, t.expression, t.status),
                }
            }
        }

        Ok(())
    }
}
