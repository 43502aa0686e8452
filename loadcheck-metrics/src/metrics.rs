use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::trend::{Trend, TrendMode, TrendSnapshot};

/// Counters are stored as fixed-point integers so concurrent additions stay exact.
pub(crate) const COUNTER_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

/// Why a single observation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ValueError {
    #[strum(to_string = "value is not a finite number")]
    NonFinite,
    #[strum(to_string = "counters only accept non-negative additions")]
    NegativeCounter,
    #[strum(to_string = "bounded trends only accept non-negative values")]
    NegativeTrend,
}

#[derive(Debug, Default)]
pub struct Counter {
    milli: AtomicU64,
    updates: AtomicU64,
}

impl Counter {
    #[inline]
    pub fn increment(&self, value: u64) {
        self.milli
            .fetch_add(value.saturating_mul(COUNTER_SCALE as u64), Ordering::Relaxed);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: f64) -> Result<(), ValueError> {
        if !value.is_finite() {
            return Err(ValueError::NonFinite);
        }
        if value < 0.0 {
            return Err(ValueError::NegativeCounter);
        }
        self.milli
            .fetch_add((value * COUNTER_SCALE).round() as u64, Ordering::Relaxed);
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn value(&self) -> f64 {
        self.milli.load(Ordering::Relaxed) as f64 / COUNTER_SCALE
    }

    /// Accepted additions, zero-valued ones included.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
    max: AtomicI64,
    updates: AtomicU64,
}

impl Gauge {
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
        self.bump_max(value);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `delta` and returns the new value.
    pub fn add(&self, delta: i64) -> i64 {
        let now = self.value.fetch_add(delta, Ordering::Relaxed) + delta;
        self.bump_max(now);
        self.updates.fetch_add(1, Ordering::Relaxed);
        now
    }

    fn bump_max(&self, candidate: i64) {
        let mut prev = self.max.load(Ordering::Relaxed);
        while candidate > prev {
            match self.max.compare_exchange_weak(
                prev,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(next) => prev = next,
            }
        }
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> i64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Rate {
    total: AtomicU64,
    hits: AtomicU64,
}

impl Rate {
    #[inline]
    pub fn add(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> RateValue {
        RateValue {
            total: self.total.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateValue {
    pub total: u64,
    pub hits: u64,
}

impl RateValue {
    pub fn misses(&self) -> u64 {
        self.total - self.hits
    }

    /// `hits / total`, 0 when nothing was observed.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

/// Writable handle to one registered metric.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

impl MetricHandle {
    pub(crate) fn new(kind: MetricKind, mode: TrendMode) -> Result<Self, crate::Error> {
        Ok(match kind {
            MetricKind::Counter => MetricHandle::Counter(Arc::default()),
            MetricKind::Gauge => MetricHandle::Gauge(Arc::default()),
            MetricKind::Rate => MetricHandle::Rate(Arc::default()),
            MetricKind::Trend => MetricHandle::Trend(Arc::new(Trend::new(mode)?)),
        })
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
            MetricHandle::Rate(_) => MetricKind::Rate,
            MetricHandle::Trend(_) => MetricKind::Trend,
        }
    }

    /// Kind-generic write. Rates treat any non-zero value as a hit; gauges round to integers.
    pub fn record(&self, value: f64) -> Result<(), ValueError> {
        match self {
            MetricHandle::Counter(c) => c.add(value),
            MetricHandle::Gauge(g) => {
                if !value.is_finite() {
                    return Err(ValueError::NonFinite);
                }
                g.set(value.round() as i64);
                Ok(())
            }
            MetricHandle::Rate(r) => {
                if value.is_nan() {
                    return Err(ValueError::NonFinite);
                }
                r.add(value != 0.0);
                Ok(())
            }
            MetricHandle::Trend(t) => t.observe(value),
        }
    }

    /// Number of accepted writes. A registered metric that was never written reports 0.
    pub fn observations(&self) -> u64 {
        match self {
            MetricHandle::Counter(c) => c.updates(),
            MetricHandle::Gauge(g) => g.updates(),
            MetricHandle::Rate(r) => r.value().total,
            MetricHandle::Trend(t) => t.count(),
        }
    }

    pub(crate) fn snapshot(&self) -> MetricValue {
        match self {
            MetricHandle::Counter(c) => MetricValue::Counter(c.value()),
            MetricHandle::Gauge(g) => MetricValue::Gauge {
                value: g.value(),
                max: g.max(),
            },
            MetricHandle::Rate(r) => MetricValue::Rate(r.value()),
            MetricHandle::Trend(t) => MetricValue::Trend(t.snapshot()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge { value: i64, max: i64 },
    Rate(RateValue),
    Trend(TrendSnapshot),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge { .. } => MetricKind::Gauge,
            MetricValue::Rate(_) => MetricKind::Rate,
            MetricValue::Trend(_) => MetricKind::Trend,
        }
    }

    pub fn as_trend(&self) -> Option<&TrendSnapshot> {
        match self {
            MetricValue::Trend(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_rate(&self) -> Option<RateValue> {
        match self {
            MetricValue::Rate(r) => Some(*r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub name: String,
    pub value: MetricValue,
    pub observations: u64,
}

impl MetricSnapshot {
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    pub fn is_observed(&self) -> bool {
        self.observations > 0
    }
}

/// Milliseconds with sub-millisecond precision, the unit every duration trend uses.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_rejects_negative_and_non_finite() {
        let c = Counter::default();
        assert_eq!(c.add(-1.0), Err(ValueError::NegativeCounter));
        assert_eq!(c.add(f64::NAN), Err(ValueError::NonFinite));
        assert_eq!(c.add(f64::INFINITY), Err(ValueError::NonFinite));
        assert_eq!(c.value(), 0.0);
        assert_eq!(c.updates(), 0);
    }

    #[test]
    fn counter_sums_fractions_exactly() {
        let c = Counter::default();
        for _ in 0..10 {
            c.add(0.1).unwrap_or_else(|e| panic!("add: {e}"));
        }
        c.increment(2);
        assert_eq!(c.value(), 3.0);
    }

    #[test]
    fn gauge_tracks_max() {
        let g = Gauge::default();
        assert_eq!(g.add(3), 3);
        assert_eq!(g.add(-2), 1);
        g.set(2);
        assert_eq!(g.value(), 2);
        assert_eq!(g.max(), 3);
        assert_eq!(g.updates(), 3);
    }

    #[test]
    fn zero_additions_still_count_as_observations() {
        let h = MetricHandle::new(MetricKind::Counter, TrendMode::Exact)
            .unwrap_or_else(|e| panic!("new: {e}"));
        assert_eq!(h.observations(), 0);
        h.record(0.0).unwrap_or_else(|e| panic!("record: {e}"));
        if let MetricHandle::Counter(c) = &h {
            c.increment(0);
        }
        assert_eq!(h.observations(), 2);
        assert_eq!(h.snapshot(), MetricValue::Counter(0.0));
    }

    #[test]
    fn rate_is_zero_without_observations() {
        let r = Rate::default();
        assert_eq!(r.value().rate(), 0.0);
        r.add(true);
        r.add(false);
        r.add(false);
        r.add(true);
        let v = r.value();
        assert_eq!(v, RateValue { total: 4, hits: 2 });
        assert_eq!(v.misses(), 2);
        assert_eq!(v.rate(), 0.5);
    }

    #[test]
    fn kind_round_trips_through_strings() {
        assert_eq!(MetricKind::Trend.to_string(), "trend");
        assert_eq!("rate".parse::<MetricKind>(), Ok(MetricKind::Rate));
    }

    #[test]
    fn generic_record_treats_non_zero_as_rate_hit() {
        let h = MetricHandle::new(MetricKind::Rate, TrendMode::Exact)
            .unwrap_or_else(|e| panic!("new: {e}"));
        h.record(1.0).unwrap_or_else(|e| panic!("record: {e}"));
        h.record(0.0).unwrap_or_else(|e| panic!("record: {e}"));
        h.record(-3.0).unwrap_or_else(|e| panic!("record: {e}"));
        assert_eq!(
            h.snapshot().as_rate(),
            Some(RateValue { total: 3, hits: 2 })
        );
    }
}
