use std::time::Duration;

use loadcheck_metrics::TrendMode;
use rand::Rng as _;

use crate::error::{Error, Result};
use crate::thresholds::{ThresholdSet, parse_threshold_expr};

/// Delay a virtual user waits between two of its iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pause {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly sampled from `[min, max]` before every pause.
    Random { min: Duration, max: Duration },
}

impl Pause {
    pub fn sample(&self) -> Option<Duration> {
        match *self {
            Pause::None => None,
            Pause::Fixed(d) => (!d.is_zero()).then_some(d),
            Pause::Random { min, max } if min >= max => (!min.is_zero()).then_some(min),
            Pause::Random { min, max } => Some(rand::thread_rng().gen_range(min..=max)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    #[default]
    Simultaneous,
    /// VU `i` (0-based) starts `i * interval` after the run starts.
    Staggered(Duration),
}

/// Run options as declared next to the scenario (file level).
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub pause: Option<Pause>,
    pub start: Option<StartMode>,
    pub thresholds: Vec<ThresholdSet>,
    pub trend_mode: Option<TrendMode>,
    pub request_timeout: Option<Duration>,
}

/// Command-line overrides; they win over [`RunOptions`].
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub pause: Option<Pause>,
    pub trend_mode: Option<TrendMode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub vus: u64,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub pause: Pause,
    pub start: StartMode,
    pub thresholds: Vec<ThresholdSet>,
    pub trend_mode: TrendMode,
    /// Applied to requests that carry no timeout of their own.
    pub request_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            vus: 1,
            iterations: Some(1),
            duration: None,
            pause: Pause::None,
            start: StartMode::Simultaneous,
            thresholds: Vec::new(),
            trend_mode: TrendMode::Exact,
            request_timeout: None,
        }
    }
}

impl RunConfig {
    /// Merges overrides over file options over defaults, then validates the result.
    pub fn resolve(opts: RunOptions, overrides: &RunOverrides) -> Result<Self> {
        let duration = overrides.duration.or(opts.duration);

        // Without a duration the run defaults to a single iteration.
        let iterations = overrides
            .iterations
            .or(opts.iterations)
            .or_else(|| duration.is_none().then_some(1));

        let cfg = Self {
            vus: overrides.vus.or(opts.vus).unwrap_or(1),
            iterations,
            duration,
            pause: overrides.pause.or(opts.pause).unwrap_or_default(),
            start: opts.start.unwrap_or_default(),
            thresholds: opts.thresholds,
            trend_mode: overrides.trend_mode.or(opts.trend_mode).unwrap_or_default(),
            request_timeout: opts.request_timeout,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vus == 0 {
            return Err(Error::InvalidVus);
        }
        if self.iterations == Some(0) {
            return Err(Error::InvalidIterations);
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(Error::InvalidDuration);
        }
        if let Pause::Random { min, max } = self.pause
            && min > max
        {
            return Err(Error::InvalidPause { min, max });
        }
        for set in &self.thresholds {
            for expression in &set.expressions {
                parse_threshold_expr(expression).map_err(|reason| Error::InvalidThreshold {
                    metric: set.metric.clone(),
                    expression: expression.clone(),
                    reason,
                })?;
            }
        }
        Ok(())
    }
}
