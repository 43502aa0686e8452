use crate::metrics::{MetricKind, ValueError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric `{metric}` is registered as a {registered}, not a {attempted}")]
    KindMismatch {
        metric: String,
        registered: MetricKind,
        attempted: MetricKind,
    },

    #[error("metric `{metric}` rejected value {value}: {reason}")]
    InvalidValue {
        metric: String,
        value: f64,
        reason: ValueError,
    },

    #[error("failed to create histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

pub type Result<T> = std::result::Result<T, Error>;
