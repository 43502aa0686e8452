use std::sync::Arc;

use anyhow::Context as _;
use loadcheck_core::{RunConfig, RunOverrides, Scheduler};
use loadcheck_http::{ClientConfig, HttpClient};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::run_support::merged_env;
use crate::scenario_yaml::load_scenario;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let loaded = load_scenario(&args.scenario, &env)
        .await
        .map_err(RunError::InvalidInput)?;

    let cfg = RunConfig::resolve(loaded.options, &overrides(&args)).map_err(RunError::from_core)?;
    tracing::debug!(
        scenario = %args.scenario.display(),
        requests_per_iteration = loaded.scenario.request_count(),
        "scenario loaded"
    );

    let client = Arc::new(HttpClient::new(ClientConfig::default()));
    out.print_header(&args.scenario, &cfg);

    let mut scheduler = Scheduler::new(cfg, Arc::new(loaded.scenario), client);
    if let Some(progress) = out.progress() {
        scheduler = scheduler.with_progress(progress);
    }

    let stop = scheduler.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping virtual users");
            stop.stop();
        }
    });

    let summary = scheduler.run().await;
    ctrl_c.abort();
    let summary = summary.map_err(RunError::from_core)?;

    out.print_summary(&summary).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.summary_export {
        output::write_summary_export(path, &summary)
            .await
            .context("--summary-export")
            .map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_verdict(summary.verdict))
}

fn overrides(args: &RunArgs) -> RunOverrides {
    RunOverrides {
        vus: args.vus,
        iterations: args.iterations,
        duration: args.duration,
        pause: args.pause,
        trend_mode: args.trend_mode.map(Into::into),
    }
}
