use std::time::Duration;

use crate::vu::VuState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("invalid pause range: min {min:?} is greater than max {max:?}")]
    InvalidPause { min: Duration, max: Duration },

    #[error("invalid threshold `{expression}` for metric `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("virtual user {vu}: invalid state transition {from} -> {to}")]
    InvalidTransition { vu: u64, from: VuState, to: VuState },

    #[error("metrics error: {0}")]
    Metrics(#[from] loadcheck_metrics::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
