use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::metrics::{ValueError, duration_ms};

/// Bounded trends keep values in thousandths of the recorded unit (µs for millisecond trends).
const BOUNDED_SCALE: f64 = 1000.0;
const BOUNDED_SIGFIG: u8 = 3;

/// How trend observations are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TrendMode {
    /// Every observation is kept; percentiles are exact.
    #[default]
    Exact,
    /// HDR histogram with 3 significant digits; memory stays bounded.
    Bounded,
}

#[derive(Debug)]
pub enum Trend {
    Exact(Mutex<Vec<f64>>),
    Bounded(Mutex<Histogram<u64>>),
}

impl Trend {
    pub(crate) fn new(mode: TrendMode) -> Result<Self, hdrhistogram::CreationError> {
        Ok(match mode {
            TrendMode::Exact => Trend::Exact(Mutex::new(Vec::new())),
            TrendMode::Bounded => Trend::Bounded(Mutex::new(Histogram::new(BOUNDED_SIGFIG)?)),
        })
    }

    pub fn observe(&self, value: f64) -> Result<(), ValueError> {
        if !value.is_finite() {
            return Err(ValueError::NonFinite);
        }
        match self {
            Trend::Exact(values) => values.lock().push(value),
            Trend::Bounded(h) => {
                if value < 0.0 {
                    return Err(ValueError::NegativeTrend);
                }
                // Auto-resizing histogram: every u64 fits.
                h.lock().saturating_record((value * BOUNDED_SCALE).round() as u64);
            }
        }
        Ok(())
    }

    /// Records `d` in milliseconds.
    pub fn observe_duration(&self, d: Duration) {
        let ms = duration_ms(d);
        match self {
            Trend::Exact(values) => values.lock().push(ms),
            Trend::Bounded(h) => h.lock().saturating_record((ms * BOUNDED_SCALE).round() as u64),
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            Trend::Exact(values) => values.lock().len() as u64,
            Trend::Bounded(h) => h.lock().len(),
        }
    }

    pub fn snapshot(&self) -> TrendSnapshot {
        match self {
            Trend::Exact(values) => {
                let mut sorted = values.lock().clone();
                sorted.sort_by(f64::total_cmp);
                // Summing in sorted order keeps the result independent of arrival order.
                let sum = sorted.iter().sum();
                TrendSnapshot::Exact { sorted, sum }
            }
            Trend::Bounded(h) => TrendSnapshot::Bounded(h.lock().clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrendSnapshot {
    Exact { sorted: Vec<f64>, sum: f64 },
    Bounded(Histogram<u64>),
}

impl TrendSnapshot {
    pub fn count(&self) -> u64 {
        match self {
            TrendSnapshot::Exact { sorted, .. } => sorted.len() as u64,
            TrendSnapshot::Bounded(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            TrendSnapshot::Exact { sorted, .. } => sorted.first().copied(),
            TrendSnapshot::Bounded(h) => (!h.is_empty()).then(|| h.min() as f64 / BOUNDED_SCALE),
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            TrendSnapshot::Exact { sorted, .. } => sorted.last().copied(),
            TrendSnapshot::Bounded(h) => (!h.is_empty()).then(|| h.max() as f64 / BOUNDED_SCALE),
        }
    }

    pub fn avg(&self) -> Option<f64> {
        match self {
            TrendSnapshot::Exact { sorted, sum } => {
                (!sorted.is_empty()).then(|| sum / sorted.len() as f64)
            }
            TrendSnapshot::Bounded(h) => (!h.is_empty()).then(|| h.mean() / BOUNDED_SCALE),
        }
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// `p` in `[0, 100]`. Exact trends interpolate linearly between the closest ranks.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let p = p.clamp(0.0, 100.0);
        match self {
            TrendSnapshot::Exact { sorted, .. } => interpolate(sorted, p),
            TrendSnapshot::Bounded(h) => (!h.is_empty())
                .then(|| h.value_at_quantile(p / 100.0) as f64 / BOUNDED_SCALE),
        }
    }

    pub fn stats(&self) -> TrendStats {
        TrendStats {
            count: self.count(),
            min: self.min(),
            max: self.max(),
            avg: self.avg(),
            med: self.med(),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            p99: self.percentile(99.0),
        }
    }
}

fn interpolate(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = p * last as f64 / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let a = *sorted.get(lo)?;
    let b = *sorted.get(hi)?;
    Some(a + (b - a) * (rank - lo as f64))
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrendStats {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hundreds() -> Trend {
        let t = Trend::new(TrendMode::Exact).unwrap_or_else(|e| panic!("trend: {e}"));
        for v in (1..=20).rev() {
            t.observe(f64::from(v * 100))
                .unwrap_or_else(|e| panic!("observe: {e}"));
        }
        t
    }

    fn approx(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap_or_else(|| panic!("expected {expected}, got none"));
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn exact_percentiles_interpolate() {
        let s = hundreds().snapshot();
        assert_eq!(s.count(), 20);
        approx(s.percentile(95.0), 1905.0);
        assert_eq!(s.percentile(100.0), Some(2000.0));
        assert_eq!(s.percentile(0.0), Some(100.0));
        approx(s.med(), 1050.0);
        approx(s.avg(), 1050.0);
        assert_eq!(s.min(), Some(100.0));
        assert_eq!(s.max(), Some(2000.0));
    }

    #[test]
    fn empty_trend_has_no_stats() {
        let t = Trend::new(TrendMode::Exact).unwrap_or_else(|e| panic!("trend: {e}"));
        let s = t.snapshot();
        assert!(s.is_empty());
        assert_eq!(s.stats(), TrendStats::default());
    }

    #[test]
    fn single_value_is_every_percentile() {
        let t = Trend::new(TrendMode::Exact).unwrap_or_else(|e| panic!("trend: {e}"));
        t.observe(42.0).unwrap_or_else(|e| panic!("observe: {e}"));
        let s = t.snapshot();
        assert_eq!(s.percentile(1.0), Some(42.0));
        assert_eq!(s.percentile(99.9), Some(42.0));
    }

    #[test]
    fn bounded_trend_is_close_to_exact() {
        let t = Trend::new(TrendMode::Bounded).unwrap_or_else(|e| panic!("trend: {e}"));
        for v in 1..=1000 {
            t.observe(f64::from(v)).unwrap_or_else(|e| panic!("observe: {e}"));
        }
        let s = t.snapshot();
        assert_eq!(s.count(), 1000);
        let p95 = s.percentile(95.0).unwrap_or_default();
        assert!((p95 - 950.0).abs() < 1.0, "p95 = {p95}");
        assert!(t.observe(-1.0).is_err());
    }

    #[test]
    fn durations_are_recorded_in_milliseconds() {
        let t = Trend::new(TrendMode::Exact).unwrap_or_else(|e| panic!("trend: {e}"));
        t.observe_duration(Duration::from_micros(1500));
        assert_eq!(t.snapshot().max(), Some(1.5));
    }
}
