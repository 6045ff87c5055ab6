//! Shared metric registry and recording handles

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::MetricsError;
use crate::summary::{CounterSummary, MetricSummary, RateSummary, RunSummary, TrendSummary};

/// Kind of a registered metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Distribution of numeric samples, queried by percentile
    Trend,
    /// Fraction of boolean outcomes that were true
    Rate,
    /// Monotonic sum
    Counter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Trend => write!(f, "trend"),
            MetricKind::Rate => write!(f, "rate"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

#[derive(Debug, Default)]
struct TrendData {
    retained: Vec<f64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    dropped: u64,
}

impl TrendData {
    fn record(&mut self, value: f64, bound: Option<usize>) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;

        match bound {
            Some(bound) if self.retained.len() >= bound => self.dropped += 1,
            _ => self.retained.push(value),
        }
    }
}

#[derive(Debug)]
struct TrendInner {
    name: String,
    is_time: bool,
    bound: Option<usize>,
    data: Mutex<TrendData>,
}

/// Handle to a trend metric. Time trends hold milliseconds.
#[derive(Debug, Clone)]
pub struct Trend {
    inner: Arc<TrendInner>,
}

impl Trend {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_time(&self) -> bool {
        self.inner.is_time
    }

    /// Record one sample. The lock covers only the append.
    pub fn add(&self, value: f64) {
        self.inner.data.lock().record(value, self.inner.bound);
    }

    pub fn add_duration(&self, duration: Duration) {
        self.add(duration.as_secs_f64() * 1000.0);
    }

    fn summary(&self) -> TrendSummary {
        let (retained, count, sum, min, max, dropped) = {
            let data = self.inner.data.lock();
            (
                data.retained.clone(),
                data.count,
                data.sum,
                data.min,
                data.max,
                data.dropped,
            )
        };
        TrendSummary::from_parts(count, sum, min, max, dropped, self.inner.is_time, retained)
    }
}

#[derive(Debug)]
struct RateInner {
    name: String,
    total: AtomicU64,
    passes: AtomicU64,
}

/// Handle to a rate metric
#[derive(Debug, Clone)]
pub struct Rate {
    inner: Arc<RateInner>,
}

impl Rate {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn add(&self, outcome: bool) {
        // total before passes, read in the opposite order: passes <= total
        self.inner.total.fetch_add(1, Ordering::SeqCst);
        if outcome {
            self.inner.passes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn summary(&self) -> RateSummary {
        let passes = self.inner.passes.load(Ordering::SeqCst);
        let total = self.inner.total.load(Ordering::SeqCst);
        RateSummary::new(passes, total)
    }
}

#[derive(Debug)]
struct CounterInner {
    name: String,
    value: AtomicU64,
}

/// Handle to a counter metric
#[derive(Debug, Clone)]
pub struct Counter {
    inner: Arc<CounterInner>,
}

impl Counter {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn add(&self, amount: u64) {
        self.inner.value.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn value(&self) -> u64 {
        self.inner.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Trend(Trend),
    Rate(Rate),
    Counter(Counter),
}

impl Entry {
    fn kind(&self) -> MetricKind {
        match self {
            Entry::Trend(_) => MetricKind::Trend,
            Entry::Rate(_) => MetricKind::Rate,
            Entry::Counter(_) => MetricKind::Counter,
        }
    }
}

#[derive(Debug)]
struct RegistryInner {
    metrics: RwLock<BTreeMap<String, Entry>>,
    max_samples: Option<usize>,
    started: Instant,
}

/// Named metrics shared by all iterations of a run.
///
/// Registering a name that already exists returns a handle to the existing
/// metric, provided the kind matches. A trend must also be re-registered as
/// a time trend or a plain one, as it was first.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_sample_bound(None)
    }

    /// Bound the samples each trend retains for percentile queries
    pub fn with_sample_bound(max_samples: Option<usize>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                metrics: RwLock::new(BTreeMap::new()),
                max_samples,
                started: Instant::now(),
            }),
        }
    }

    /// Time since the registry was created
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn trend(&self, name: &str) -> Result<Trend, MetricsError> {
        self.trend_with(name, false)
    }

    /// A trend whose samples are milliseconds
    pub fn time_trend(&self, name: &str) -> Result<Trend, MetricsError> {
        self.trend_with(name, true)
    }

    fn trend_with(&self, name: &str, is_time: bool) -> Result<Trend, MetricsError> {
        let bound = self.inner.max_samples;
        match self.get_or_register(name, MetricKind::Trend, || {
            Entry::Trend(Trend {
                inner: Arc::new(TrendInner {
                    name: name.to_string(),
                    is_time,
                    bound,
                    data: Mutex::new(TrendData::default()),
                }),
            })
        })? {
            Entry::Trend(trend) if trend.is_time() != is_time => Err(MetricsError::UnitMismatch {
                name: name.to_string(),
                is_time: trend.is_time(),
            }),
            Entry::Trend(trend) => Ok(trend),
            other => Err(self.mismatch(name, other.kind(), MetricKind::Trend)),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Rate, MetricsError> {
        match self.get_or_register(name, MetricKind::Rate, || {
            Entry::Rate(Rate {
                inner: Arc::new(RateInner {
                    name: name.to_string(),
                    total: AtomicU64::new(0),
                    passes: AtomicU64::new(0),
                }),
            })
        })? {
            Entry::Rate(rate) => Ok(rate),
            other => Err(self.mismatch(name, other.kind(), MetricKind::Rate)),
        }
    }

    pub fn counter(&self, name: &str) -> Result<Counter, MetricsError> {
        match self.get_or_register(name, MetricKind::Counter, || {
            Entry::Counter(Counter {
                inner: Arc::new(CounterInner {
                    name: name.to_string(),
                    value: AtomicU64::new(0),
                }),
            })
        })? {
            Entry::Counter(counter) => Ok(counter),
            other => Err(self.mismatch(name, other.kind(), MetricKind::Counter)),
        }
    }

    /// Names of all registered metrics, sorted
    pub fn names(&self) -> Vec<String> {
        self.inner.metrics.read().keys().cloned().collect()
    }

    /// Summarise every registered metric as of now
    pub fn summary(&self) -> RunSummary {
        let entries: Vec<(String, Entry)> = self
            .inner
            .metrics
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        let elapsed = self.elapsed();

        let metrics = entries
            .into_iter()
            .map(|(name, entry)| {
                let summary = match entry {
                    Entry::Trend(trend) => MetricSummary::Trend(trend.summary()),
                    Entry::Rate(rate) => MetricSummary::Rate(rate.summary()),
                    Entry::Counter(counter) => {
                        MetricSummary::Counter(CounterSummary::new(counter.value(), elapsed))
                    }
                };
                (name, summary)
            })
            .collect();

        RunSummary { elapsed, metrics }
    }

    fn get_or_register(
        &self,
        name: &str,
        kind: MetricKind,
        create: impl FnOnce() -> Entry,
    ) -> Result<Entry, MetricsError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }

        if let Some(entry) = self.inner.metrics.read().get(name) {
            return Ok(entry.clone());
        }

        let mut metrics = self.inner.metrics.write();
        let entry = metrics.entry(name.to_string()).or_insert_with(create);
        if entry.kind() != kind {
            return Err(self.mismatch(name, entry.kind(), kind));
        }
        Ok(entry.clone())
    }

    fn mismatch(&self, name: &str, existing: MetricKind, requested: MetricKind) -> MetricsError {
        MetricsError::KindMismatch {
            name: name.to_string(),
            existing,
            requested,
        }
    }
}
