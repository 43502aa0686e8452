pub mod builtin_metrics;
mod check;
mod config;
mod error;
mod gate;
mod iteration;
mod progress;
mod scheduler;
mod summary;
mod thresholds;
mod thresholds_eval;
mod transport;
mod vu;

pub use check::{
    CheckEvaluator, CheckLog, CheckOutcome, CheckResult, CheckTally, IterationId, qualified_name,
};
pub use config::{Pause, RunConfig, RunOptions, RunOverrides, StartMode};
pub use error::{Error, Result};
pub use gate::IterationGate;
pub use iteration::{
    GroupGuard, IterationContext, IterationOutcome, IterationResult, RequestOutcome, RunContext,
    run_iteration,
};
pub use progress::{ProgressFn, ProgressUpdate};
pub use scheduler::Scheduler;
pub use summary::RunSummary;
pub use thresholds::{ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdSet, parse_threshold_expr};
pub use thresholds_eval::{ThresholdResult, ThresholdStatus, Verdict, evaluate_thresholds};
pub use transport::{Scenario, Transport, TransportError};
pub use vu::{StartSignal, StopHandle, StopSignal, VuLifecycle, VuState};

pub use loadcheck_http::{HttpRequest, HttpResponse};
pub use loadcheck_metrics::{MetricKind, TrendMode};
