pub mod error;
pub mod metrics;
pub mod registry;
pub mod trend;

pub use error::{Error, Result};
pub use metrics::{
    Counter, Gauge, MetricHandle, MetricKind, MetricSnapshot, MetricValue, Rate, RateValue,
    ValueError, duration_ms,
};
pub use registry::{KindConflict, MetricsSnapshot, Registry, RejectedValue};
pub use trend::{Trend, TrendMode, TrendSnapshot, TrendStats};
