use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Decides whether another iteration may start.
///
/// Shared by every virtual user of a run. Only iteration starts are gated; an iteration that
/// already started always runs to completion.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied()
    }

    /// Claims the next iteration and returns its run-wide index, or `None` once the budget
    /// is spent or the deadline passed.
    pub fn next(&self) -> Option<u64> {
        if self.duration.is_some() {
            let now = Instant::now();
            let deadline = *self.deadline.get_or_init(|| now + self.duration.unwrap_or_default());
            if now >= deadline {
                return None;
            }
        }

        // Neither iterations nor duration => run once.
        let budget = match (self.iterations, self.duration) {
            (Some(total), _) => Some(total),
            (None, None) => Some(1),
            (None, Some(_)) => None,
        };

        match budget {
            Some(total) => {
                // fetch_update so a refused claim does not keep growing the counter.
                self.counter
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |idx| {
                        (idx < total).then_some(idx + 1)
                    })
                    .ok()
            }
            None => Some(self.counter.fetch_add(1, Ordering::AcqRel)),
        }
    }

    /// True when no further iteration can start.
    pub fn is_exhausted(&self) -> bool {
        let budget_spent = match (self.iterations, self.duration) {
            (Some(total), _) => self.counter.load(Ordering::Acquire) >= total,
            (None, None) => self.counter.load(Ordering::Acquire) >= 1,
            (None, Some(_)) => false,
        };
        budget_spent || self.deadline().is_some_and(|d| Instant::now() >= d)
    }

    /// Iterations claimed so far.
    pub fn started(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Resolves when the deadline passes; never resolves without a duration.
    pub async fn deadline_reached(&self) {
        match self.deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
            None => std::future::pending().await,
        }
    }
}
