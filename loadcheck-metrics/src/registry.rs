use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::metrics::{
    Counter, Gauge, MetricHandle, MetricKind, MetricSnapshot, Rate, ValueError,
};
use crate::trend::{Trend, TrendMode};

/// A write that targeted an existing metric with a different kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindConflict {
    pub metric: String,
    pub registered: MetricKind,
    pub attempted: MetricKind,
    pub count: u64,
}

/// Observations refused by a metric (negative counter additions, NaN, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedValue {
    pub metric: String,
    pub reason: ValueError,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct Registry {
    trend_mode: TrendMode,
    metrics: DashMap<Arc<str>, MetricHandle, ahash::RandomState>,
    conflicts: Mutex<Vec<KindConflict>>,
    rejected: Mutex<Vec<RejectedValue>>,
}

impl Registry {
    pub fn new(trend_mode: TrendMode) -> Self {
        Self {
            trend_mode,
            ..Self::default()
        }
    }

    pub fn trend_mode(&self) -> TrendMode {
        self.trend_mode
    }

    /// Returns the metric named `name`, creating it on first use.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricHandle> {
        let handle = match self.metrics.get(name) {
            Some(existing) => existing.value().clone(),
            None => match self.metrics.entry(Arc::from(name)) {
                Entry::Occupied(e) => e.get().clone(),
                Entry::Vacant(v) => {
                    let handle = MetricHandle::new(kind, self.trend_mode)?;
                    v.insert(handle.clone());
                    handle
                }
            },
        };

        if handle.kind() != kind {
            return Err(Error::KindMismatch {
                metric: name.to_string(),
                registered: handle.kind(),
                attempted: kind,
            });
        }
        Ok(handle)
    }

    pub fn counter(&self, name: &str) -> Result<Arc<Counter>> {
        match self.register(name, MetricKind::Counter)? {
            MetricHandle::Counter(c) => Ok(c),
            other => Err(mismatch(name, other.kind(), MetricKind::Counter)),
        }
    }

    pub fn gauge(&self, name: &str) -> Result<Arc<Gauge>> {
        match self.register(name, MetricKind::Gauge)? {
            MetricHandle::Gauge(g) => Ok(g),
            other => Err(mismatch(name, other.kind(), MetricKind::Gauge)),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Arc<Rate>> {
        match self.register(name, MetricKind::Rate)? {
            MetricHandle::Rate(r) => Ok(r),
            other => Err(mismatch(name, other.kind(), MetricKind::Rate)),
        }
    }

    pub fn trend(&self, name: &str) -> Result<Arc<Trend>> {
        match self.register(name, MetricKind::Trend)? {
            MetricHandle::Trend(t) => Ok(t),
            other => Err(mismatch(name, other.kind(), MetricKind::Trend)),
        }
    }

    /// Records one observation, creating the metric on first use.
    ///
    /// Kind conflicts and refused values are also kept for the snapshot, so a caller that
    /// ignores the error still gets them reported.
    pub fn record(&self, name: &str, kind: MetricKind, value: f64) -> Result<()> {
        let handle = match self.register(name, kind) {
            Ok(h) => h,
            Err(Error::KindMismatch {
                metric,
                registered,
                attempted,
            }) => {
                tracing::warn!(%metric, %registered, %attempted, "metric kind conflict");
                self.note_conflict(&metric, registered, attempted);
                return Err(Error::KindMismatch {
                    metric,
                    registered,
                    attempted,
                });
            }
            Err(err) => return Err(err),
        };

        handle.record(value).map_err(|reason| {
            tracing::warn!(metric = name, value, %reason, "metric value rejected");
            self.note_rejected(name, reason);
            Error::InvalidValue {
                metric: name.to_string(),
                value,
                reason,
            }
        })
    }

    fn note_conflict(&self, metric: &str, registered: MetricKind, attempted: MetricKind) {
        let mut conflicts = self.conflicts.lock();
        match conflicts
            .iter_mut()
            .find(|c| c.metric == metric && c.attempted == attempted)
        {
            Some(c) => c.count += 1,
            None => conflicts.push(KindConflict {
                metric: metric.to_string(),
                registered,
                attempted,
                count: 1,
            }),
        }
    }

    fn note_rejected(&self, metric: &str, reason: ValueError) {
        let mut rejected = self.rejected.lock();
        match rejected
            .iter_mut()
            .find(|r| r.metric == metric && r.reason == reason)
        {
            Some(r) => r.count += 1,
            None => rejected.push(RejectedValue {
                metric: metric.to_string(),
                reason,
                count: 1,
            }),
        }
    }

    /// Point-in-time copy of every metric, sorted by name.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut metrics: Vec<MetricSnapshot> = self
            .metrics
            .iter()
            .map(|entry| MetricSnapshot {
                name: entry.key().to_string(),
                value: entry.value().snapshot(),
                observations: entry.value().observations(),
            })
            .collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));

        let mut conflicts = self.conflicts.lock().clone();
        conflicts.sort_by(|a, b| {
            (a.metric.as_str(), a.attempted.to_string())
                .cmp(&(b.metric.as_str(), b.attempted.to_string()))
        });
        let mut rejected = self.rejected.lock().clone();
        rejected.sort_by(|a, b| {
            (a.metric.as_str(), a.reason.to_string()).cmp(&(b.metric.as_str(), b.reason.to_string()))
        });

        MetricsSnapshot {
            metrics,
            conflicts,
            rejected,
        }
    }
}

fn mismatch(metric: &str, registered: MetricKind, attempted: MetricKind) -> Error {
    Error::KindMismatch {
        metric: metric.to_string(),
        registered,
        attempted,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub metrics: Vec<MetricSnapshot>,
    pub conflicts: Vec<KindConflict>,
    pub rejected: Vec<RejectedValue>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics
            .binary_search_by(|m| m.name.as_str().cmp(name))
            .ok()
            .and_then(|idx| self.metrics.get(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSnapshot> {
        self.metrics.iter()
    }

    pub fn has_conflict(&self, name: &str) -> bool {
        self.conflicts.iter().any(|c| c.metric == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricValue, RateValue};
    use rand::seq::SliceRandom;

    #[derive(Clone, Copy)]
    enum Op {
        Counter(f64),
        Rate(bool),
        Trend(f64),
    }

    fn ops() -> Vec<Op> {
        let mut out = Vec::new();
        for i in 0..500u32 {
            out.push(Op::Counter(f64::from(i % 7) * 0.1));
            out.push(Op::Rate(i % 3 == 0));
            out.push(Op::Trend(f64::from(i) * 1.37 + 0.01));
        }
        out
    }

    fn apply(registry: &Registry, op: Op) {
        let res = match op {
            Op::Counter(v) => registry.record("c", MetricKind::Counter, v),
            Op::Rate(v) => registry.record("r", MetricKind::Rate, if v { 1.0 } else { 0.0 }),
            Op::Trend(v) => registry.record("t", MetricKind::Trend, v),
        };
        res.unwrap_or_else(|e| panic!("record: {e}"));
    }

    #[test]
    fn snapshots_do_not_depend_on_record_order() {
        let ordered = Registry::default();
        for op in ops() {
            apply(&ordered, op);
        }

        let mut shuffled_ops = ops();
        shuffled_ops.shuffle(&mut rand::thread_rng());
        let concurrent = Registry::default();
        std::thread::scope(|s| {
            for chunk in shuffled_ops.chunks(97) {
                let registry = &concurrent;
                s.spawn(move || {
                    for op in chunk {
                        apply(registry, *op);
                    }
                });
            }
        });

        assert_eq!(ordered.snapshot(), concurrent.snapshot());
    }

    #[test]
    fn kind_conflicts_are_counted_not_fatal() {
        let r = Registry::default();
        r.record("latency", MetricKind::Trend, 5.0)
            .unwrap_or_else(|e| panic!("record: {e}"));
        assert!(matches!(
            r.record("latency", MetricKind::Counter, 1.0),
            Err(Error::KindMismatch { .. })
        ));
        assert!(r.record("latency", MetricKind::Counter, 2.0).is_err());

        let snap = r.snapshot();
        assert!(snap.has_conflict("latency"));
        assert_eq!(
            snap.conflicts,
            vec![KindConflict {
                metric: "latency".to_string(),
                registered: MetricKind::Trend,
                attempted: MetricKind::Counter,
                count: 2,
            }]
        );
        let trend = snap
            .get("latency")
            .and_then(|m| m.value.as_trend())
            .unwrap_or_else(|| panic!("latency trend missing"));
        assert_eq!(trend.count(), 1);
    }

    #[test]
    fn eager_register_reports_mismatch() {
        let r = Registry::default();
        r.rate("checks").unwrap_or_else(|e| panic!("rate: {e}"));
        assert!(matches!(
            r.trend("checks"),
            Err(Error::KindMismatch {
                registered: MetricKind::Rate,
                attempted: MetricKind::Trend,
                ..
            })
        ));
        // Eager registration errors are returned, not collected.
        assert!(r.snapshot().conflicts.is_empty());
    }

    #[test]
    fn rejected_values_are_reported() {
        let r = Registry::default();
        assert!(r.record("data_sent", MetricKind::Counter, -5.0).is_err());
        let snap = r.snapshot();
        assert_eq!(snap.rejected.len(), 1);
        assert_eq!(snap.rejected[0].reason, ValueError::NegativeCounter);
        assert_eq!(
            snap.get("data_sent").map(|m| &m.value),
            Some(&MetricValue::Counter(0.0))
        );
        assert_eq!(snap.get("data_sent").map(MetricSnapshot::is_observed), Some(false));
    }

    #[test]
    fn registered_metrics_start_unobserved() {
        let r = Registry::default();
        let reqs = r.counter("http_reqs").unwrap_or_else(|e| panic!("counter: {e}"));
        r.gauge("vus").unwrap_or_else(|e| panic!("gauge: {e}"));
        reqs.increment(1);

        let snap = r.snapshot();
        assert_eq!(snap.get("http_reqs").map(|m| m.observations), Some(1));
        assert_eq!(snap.get("vus").map(|m| m.observations), Some(0));
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let r = Registry::default();
        for name in ["zeta", "alpha", "mid"] {
            r.record(name, MetricKind::Rate, 1.0)
                .unwrap_or_else(|e| panic!("record: {e}"));
        }
        let snap = r.snapshot();
        let names: Vec<&str> = snap.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(
            snap.get("mid").and_then(|m| m.value.as_rate()),
            Some(RateValue { total: 1, hits: 1 })
        );
        assert!(snap.get("missing").is_none());
    }
}
