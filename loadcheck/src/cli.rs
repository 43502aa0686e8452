use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use loadcheck_core::{Pause, TrendMode};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    let unit = unit_str.trim();
    match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "us" | "µs" | "usec" | "usecs" | "microsecond" | "microseconds" => {
            Ok(Duration::from_micros(value))
        }
        "ns" | "nsec" | "nsecs" | "nanosecond" | "nanoseconds" => Ok(Duration::from_nanos(value)),
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

/// `1s` for a fixed pause, `500ms..1500ms` for a random one.
fn parse_pause(input: &str) -> Result<Pause, String> {
    match input.split_once("..") {
        Some((min, max)) => {
            let min = parse_duration(min)?;
            let max = parse_duration(max)?;
            if min > max {
                return Err(format!("invalid pause '{input}' (min is greater than max)"));
            }
            Ok(Pause::Random { min, max })
        }
        None => parse_duration(input).map(Pause::Fixed),
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TrendModeArg {
    /// Keep every sample; exact percentiles.
    Exact,
    /// Fixed-memory histogram; percentiles within 0.1%.
    Bounded,
}

impl From<TrendModeArg> for TrendMode {
    fn from(value: TrendModeArg) -> Self {
        match value {
            TrendModeArg::Exact => TrendMode::Exact,
            TrendModeArg::Bounded => TrendMode::Bounded,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "loadcheck",
    author,
    version,
    about = "Scriptable HTTP load and correctness testing",
    long_about = "loadcheck drives a pool of virtual users through a YAML scenario, checks every response, and evaluates thresholds over the collected metrics.\n\nThe exit code is 0 when every threshold passes and 11 when one fails; failed checks alone do not fail the run.\n\nEnvironment variables of the current process are visible to `${NAME:-default}` placeholders; use `--env KEY=VALUE` to add/override values.",
    after_help = "Examples:\n  loadcheck run demos/reqres.yaml\n  loadcheck run demos/reqres.yaml --vus 50 --duration 30s\n  loadcheck run demos/reqres.yaml --iterations 1000 --pause 0s --output json\n  loadcheck run demos/reqres.yaml --env BASE_URL=http://127.0.0.1:8080"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test scenario
    #[command(
        long_about = "Run a YAML scenario with the configured number of virtual users.\n\nCLI flags override values from the scenario's `options` block."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,

    /// Override iterations (otherwise use `options.iterations` or default=1)
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Number of virtual users
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Pause between iterations of one virtual user (e.g. 1s or 500ms..1500ms)
    #[arg(long, value_parser = parse_pause)]
    pub pause: Option<Pause>,

    /// How trend metrics keep their samples
    #[arg(long, value_enum)]
    pub trend_mode: Option<TrendModeArg>,

    /// Add/override env vars visible to the scenario (repeatable, KEY=VALUE).
    /// CLI-provided vars override the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write the end-of-test summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub summary_export: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_pause_fixed_and_range() {
        assert_eq!(parse_pause("1s"), Ok(Pause::Fixed(Duration::from_secs(1))));
        assert_eq!(
            parse_pause("500ms..1500ms"),
            Ok(Pause::Random {
                min: Duration::from_millis(500),
                max: Duration::from_millis(1500),
            })
        );
        assert!(parse_pause("2s..1s").is_err());
        assert!(parse_pause("..1s").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "loadcheck",
            "run",
            "reqres.yaml",
            "--iterations",
            "10",
            "--vus",
            "2",
            "--duration",
            "250ms",
            "--pause",
            "0s",
            "--env",
            "FOO=bar",
            "--env",
            "EMPTY=",
            "--output",
            "json",
            "--summary-export",
            "out/summary.json",
            "--trend-mode",
            "bounded",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.scenario, PathBuf::from("reqres.yaml"));
        assert_eq!(args.iterations, Some(10));
        assert_eq!(args.vus, Some(2));
        assert_eq!(args.duration, Some(Duration::from_millis(250)));
        assert_eq!(args.pause, Some(Pause::Fixed(Duration::ZERO)));
        assert_eq!(args.env, vec!["FOO=bar".to_string(), "EMPTY=".to_string()]);
        assert!(matches!(args.output, OutputFormat::Json));
        assert_eq!(args.summary_export, Some(PathBuf::from("out/summary.json")));
        assert_eq!(args.trend_mode, Some(TrendModeArg::Bounded));
    }

    #[test]
    fn cli_defaults_to_human_output() {
        let cli = Cli::try_parse_from(["loadcheck", "run", "reqres.yaml"])
            .unwrap_or_else(|err| panic!("failed to parse args: {err}"));
        let Command::Run(args) = cli.command;
        assert!(matches!(args.output, OutputFormat::HumanReadable));
        assert_eq!(args.pause, None);
        assert_eq!(args.summary_export, None);
    }
}
