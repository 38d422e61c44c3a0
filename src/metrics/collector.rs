//! Metrics Collector
//!
//! In-process registry handing out meters, histograms and usage interval
//! counters by name. Meters and histograms are mirrored into a prometheus
//! registry so they can be scraped by whoever owns the process.

use super::{
    Histogram, HistogramSnapshot, IntervalCounter, Meter, MeterSnapshot, Registry, UsageInterval,
};
use crate::config::MetricsConfig;
use prometheus::{HistogramOpts, IntCounter, Opts, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

/// Default message size buckets, in bytes
pub const DEFAULT_HISTOGRAM_BUCKETS: [f64; 8] = [
    64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0,
];

/// Registry of named metric handles.
///
/// Lookups are get-or-create: asking twice for the same name shares one live
/// metric. Every lookup hands out its own handle, and the metric is removed
/// only when the last handle sharing it is disposed. A link that reconnects
/// under the same id therefore keeps its metrics when the old tap closes.
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    prometheus: prometheus::Registry,
    namespace: Option<String>,
    histogram_buckets: Vec<f64>,
    meters: RwLock<HashMap<String, Arc<RegisteredMeter>>>,
    histograms: RwLock<HashMap<String, Arc<RegisteredHistogram>>>,
    usage_counters: RwLock<HashMap<String, Arc<UsageCounter>>>,
}

impl MetricsRegistry {
    /// Create a registry with default settings
    pub fn new() -> Self {
        Self::from_config(&MetricsConfig::default())
    }

    /// Create a registry from configuration
    pub fn from_config(config: &MetricsConfig) -> Self {
        let histogram_buckets = if config.histogram_buckets.is_empty() {
            DEFAULT_HISTOGRAM_BUCKETS.to_vec()
        } else {
            config.histogram_buckets.clone()
        };

        Self {
            inner: Arc::new(RegistryInner {
                prometheus: prometheus::Registry::new(),
                namespace: config.namespace.clone(),
                histogram_buckets,
                meters: RwLock::new(HashMap::new()),
                histograms: RwLock::new(HashMap::new()),
                usage_counters: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get a snapshot of a live meter
    pub fn meter_snapshot(&self, name: &str) -> Option<MeterSnapshot> {
        let meters = read_lock(&self.inner.meters);
        meters.get(name).map(|meter| meter.snapshot())
    }

    /// Get a snapshot of a live histogram
    pub fn histogram_snapshot(&self, name: &str) -> Option<HistogramSnapshot> {
        let histograms = read_lock(&self.inner.histograms);
        histograms.get(name).map(|histogram| histogram.snapshot())
    }

    /// Get a live usage interval counter
    pub fn usage_counter(&self, name: &str) -> Option<Arc<UsageCounter>> {
        read_lock(&self.inner.usage_counters).get(name).cloned()
    }

    /// Whether any live metric is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.meter_snapshot(name).is_some()
            || self.histogram_snapshot(name).is_some()
            || self.usage_counter(name).is_some()
    }

    /// Names of every live metric, sorted
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        names.extend(read_lock(&self.inner.meters).keys().cloned());
        names.extend(read_lock(&self.inner.histograms).keys().cloned());
        names.extend(read_lock(&self.inner.usage_counters).keys().cloned());
        names.sort();
        names
    }

    /// Drain every completed usage interval across all counters
    pub fn flush_usage(&self, now: SystemTime) -> Vec<UsageInterval> {
        self.drain_counters(|counter| counter.flush_completed(now))
    }

    /// Drain every usage interval, including the ones still open.
    ///
    /// Meant for shutdown, when no later flush will pick up the open buckets.
    pub fn drain_usage(&self) -> Vec<UsageInterval> {
        self.drain_counters(UsageCounter::flush_all)
    }

    fn drain_counters<F>(&self, drain: F) -> Vec<UsageInterval>
    where
        F: Fn(&UsageCounter) -> Vec<UsageInterval>,
    {
        let counters: Vec<Arc<UsageCounter>> =
            read_lock(&self.inner.usage_counters).values().cloned().collect();

        let mut intervals: Vec<UsageInterval> = counters
            .iter()
            .flat_map(|counter| drain(counter.as_ref()))
            .collect();
        intervals.sort_by(|a, b| {
            a.interval_start
                .cmp(&b.interval_start)
                .then_with(|| a.counter.cmp(&b.counter))
        });
        intervals
    }

    /// Export meters and histograms in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.prometheus.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for MetricsRegistry {
    fn meter(&self, name: &str) -> Arc<dyn Meter> {
        acquire(&self.inner, name, || {
            debug!(metric = %name, "Registering meter");
            RegisteredMeter {
                name: name.to_string(),
                count: AtomicU64::new(0),
                created: Instant::now(),
                exported: self.inner.export_counter(name),
                holders: AtomicUsize::new(0),
            }
        })
    }

    fn histogram(&self, name: &str) -> Arc<dyn Histogram> {
        acquire(&self.inner, name, || {
            debug!(metric = %name, "Registering histogram");
            RegisteredHistogram {
                name: name.to_string(),
                count: AtomicU64::new(0),
                sum: AtomicU64::new(0),
                min: AtomicU64::new(u64::MAX),
                max: AtomicU64::new(0),
                exported: self.inner.export_histogram(name),
                holders: AtomicUsize::new(0),
            }
        })
    }

    fn interval_counter(&self, name: &str, interval: Duration) -> Arc<dyn IntervalCounter> {
        let handle = acquire(&self.inner, name, || {
            debug!(
                metric = %name,
                interval_secs = interval.as_secs(),
                "Registering interval counter"
            );
            UsageCounter {
                name: name.to_string(),
                interval,
                buckets: Mutex::new(BTreeMap::new()),
                holders: AtomicUsize::new(0),
            }
        });
        if handle.shared.interval != interval {
            debug!(
                metric = %name,
                existing_secs = handle.shared.interval.as_secs(),
                requested_secs = interval.as_secs(),
                "Interval counter already registered with a different interval"
            );
        }
        handle
    }
}

impl RegistryInner {
    fn export_counter(&self, name: &str) -> Option<IntCounter> {
        let mut opts = Opts::new(prometheus_name(name), format!("Meter {}", name));
        if let Some(namespace) = &self.namespace {
            opts = opts.namespace(namespace.clone());
        }

        let counter = match IntCounter::with_opts(opts) {
            Ok(counter) => counter,
            Err(e) => {
                warn!(metric = %name, error = %e, "Failed to create prometheus counter");
                return None;
            }
        };

        match self.prometheus.register(Box::new(counter.clone())) {
            Ok(()) => Some(counter),
            Err(e) => {
                warn!(metric = %name, error = %e, "Failed to register prometheus counter");
                None
            }
        }
    }

    fn export_histogram(&self, name: &str) -> Option<prometheus::Histogram> {
        let mut opts = HistogramOpts::new(prometheus_name(name), format!("Histogram {}", name))
            .buckets(self.histogram_buckets.clone());
        if let Some(namespace) = &self.namespace {
            opts = opts.namespace(namespace.clone());
        }

        let histogram = match prometheus::Histogram::with_opts(opts) {
            Ok(histogram) => histogram,
            Err(e) => {
                warn!(metric = %name, error = %e, "Failed to create prometheus histogram");
                return None;
            }
        };

        match self.prometheus.register(Box::new(histogram.clone())) {
            Ok(()) => Some(histogram),
            Err(e) => {
                warn!(metric = %name, error = %e, "Failed to register prometheus histogram");
                None
            }
        }
    }

    fn unregister_collector(&self, name: &str, collector: Box<dyn prometheus::core::Collector>) {
        if let Err(e) = self.prometheus.unregister(collector) {
            debug!(metric = %name, error = %e, "Prometheus collector was not registered");
        }
    }
}

/// Convert a dotted metric name into a valid prometheus metric name
pub fn prometheus_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// A metric kept in one of the registry's name maps
trait Tracked: Sized {
    fn name(&self) -> &str;

    /// Number of undisposed handles sharing this metric
    fn holders(&self) -> &AtomicUsize;

    fn slot(registry: &RegistryInner) -> &RwLock<HashMap<String, Arc<Self>>>;

    fn unregister(&self, registry: &RegistryInner);
}

/// One caller's handle on a shared metric
struct Handle<T> {
    shared: Arc<T>,
    registry: Weak<RegistryInner>,
    disposed: AtomicBool,
}

fn acquire<T, F>(registry: &Arc<RegistryInner>, name: &str, create: F) -> Arc<Handle<T>>
where
    T: Tracked,
    F: FnOnce() -> T,
{
    let slot = T::slot(registry);
    // Holders only change under the map lock, so a release cannot remove a
    // metric that is being handed out.
    let existing = read_lock(slot).get(name).map(|shared| {
        shared.holders().fetch_add(1, Ordering::AcqRel);
        shared.clone()
    });

    let shared = match existing {
        Some(shared) => shared,
        None => {
            let mut handles = write_lock(slot);
            let shared = handles
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(create()))
                .clone();
            shared.holders().fetch_add(1, Ordering::AcqRel);
            shared
        }
    };

    Arc::new(Handle {
        shared,
        registry: Arc::downgrade(registry),
        disposed: AtomicBool::new(false),
    })
}

impl<T: Tracked> Handle<T> {
    fn release(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        let name = self.shared.name();
        let mut handles = write_lock(T::slot(&registry));
        if self.shared.holders().fetch_sub(1, Ordering::AcqRel) > 1 {
            debug!(metric = %name, "Released shared metric handle");
            return;
        }

        let current = handles
            .get(name)
            .map_or(false, |existing| Arc::ptr_eq(existing, &self.shared));
        if current {
            handles.remove(name);
            self.shared.unregister(&registry);
            debug!(metric = %name, "Disposed metric");
        }
    }
}

struct RegisteredMeter {
    name: String,
    count: AtomicU64,
    created: Instant,
    exported: Option<IntCounter>,
    holders: AtomicUsize,
}

impl RegisteredMeter {
    fn snapshot(&self) -> MeterSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let elapsed = self.created.elapsed().as_secs_f64();
        MeterSnapshot {
            name: self.name.clone(),
            count,
            mean_rate: if elapsed > 0.0 { count as f64 / elapsed } else { 0.0 },
        }
    }
}

impl Tracked for RegisteredMeter {
    fn name(&self) -> &str {
        &self.name
    }

    fn holders(&self) -> &AtomicUsize {
        &self.holders
    }

    fn slot(registry: &RegistryInner) -> &RwLock<HashMap<String, Arc<Self>>> {
        &registry.meters
    }

    fn unregister(&self, registry: &RegistryInner) {
        if let Some(counter) = &self.exported {
            registry.unregister_collector(&self.name, Box::new(counter.clone()));
        }
    }
}

impl Meter for Handle<RegisteredMeter> {
    fn mark(&self, n: u64) {
        let meter = &self.shared;
        meter.count.fetch_add(n, Ordering::Relaxed);
        if let Some(counter) = &meter.exported {
            counter.inc_by(n);
        }
    }

    fn dispose(&self) {
        self.release();
    }
}

struct RegisteredHistogram {
    name: String,
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    exported: Option<prometheus::Histogram>,
    holders: AtomicUsize,
}

impl RegisteredHistogram {
    fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let (min, max) = if count == 0 {
            (None, None)
        } else {
            (Some(self.min.load(Ordering::Relaxed)), Some(self.max.load(Ordering::Relaxed)))
        };
        HistogramSnapshot {
            name: self.name.clone(),
            count,
            sum: self.sum.load(Ordering::Relaxed),
            min,
            max,
        }
    }
}

impl Tracked for RegisteredHistogram {
    fn name(&self) -> &str {
        &self.name
    }

    fn holders(&self) -> &AtomicUsize {
        &self.holders
    }

    fn slot(registry: &RegistryInner) -> &RwLock<HashMap<String, Arc<Self>>> {
        &registry.histograms
    }

    fn unregister(&self, registry: &RegistryInner) {
        if let Some(histogram) = &self.exported {
            registry.unregister_collector(&self.name, Box::new(histogram.clone()));
        }
    }
}

impl Histogram for Handle<RegisteredHistogram> {
    fn update(&self, value: u64) {
        let histogram = &self.shared;
        histogram.count.fetch_add(1, Ordering::Relaxed);
        histogram.sum.fetch_add(value, Ordering::Relaxed);
        histogram.min.fetch_min(value, Ordering::Relaxed);
        histogram.max.fetch_max(value, Ordering::Relaxed);
        if let Some(exported) = &histogram.exported {
            exported.observe(value as f64);
        }
    }

    fn dispose(&self) {
        self.release();
    }
}

/// Usage interval counter.
///
/// Amounts are accumulated per key inside buckets of `interval` width aligned
/// to the unix epoch.
pub struct UsageCounter {
    name: String,
    interval: Duration,
    buckets: Mutex<BTreeMap<u64, HashMap<String, u64>>>,
    holders: AtomicUsize,
}

impl UsageCounter {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn interval_secs(&self) -> u64 {
        self.interval.as_secs().max(1)
    }

    /// Start of the bucket containing `at`, in unix seconds
    pub fn bucket_start(&self, at: SystemTime) -> u64 {
        let secs = at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        secs - secs % self.interval_secs()
    }

    /// Sum for `key` across all buckets still held
    pub fn total_for(&self, key: &str) -> u64 {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.values().filter_map(|values| values.get(key)).sum()
    }

    /// Amount recorded for `key` in the bucket starting at `interval_start`
    pub fn value(&self, interval_start: u64, key: &str) -> Option<u64> {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.get(&interval_start).and_then(|values| values.get(key)).copied()
    }

    /// Keys with at least one recorded amount, sorted
    pub fn keys(&self) -> Vec<String> {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = buckets
            .values()
            .flat_map(|values| values.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Remove and return every bucket that ended at or before `now`
    pub fn flush_completed(&self, now: SystemTime) -> Vec<UsageInterval> {
        let now_secs = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let width = self.interval_secs();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let completed: Vec<u64> = buckets
            .keys()
            .copied()
            .take_while(|start| start + width <= now_secs)
            .collect();

        completed
            .into_iter()
            .filter_map(|start| {
                let values = buckets.remove(&start)?;
                Some(self.to_interval(start, values))
            })
            .collect()
    }

    /// Remove and return every bucket, completed or not
    pub fn flush_all(&self) -> Vec<UsageInterval> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buckets)
            .into_iter()
            .map(|(start, values)| self.to_interval(start, values))
            .collect()
    }

    fn record(&self, key: &str, at: SystemTime, amount: u64) {
        let start = self.bucket_start(at);
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let values = buckets.entry(start).or_default();
        match values.get_mut(key) {
            Some(total) => *total += amount,
            None => {
                values.insert(key.to_string(), amount);
            }
        }
    }

    fn to_interval(&self, start: u64, values: HashMap<String, u64>) -> UsageInterval {
        UsageInterval {
            counter: self.name.clone(),
            interval_start: start,
            interval_secs: self.interval_secs(),
            values: values.into_iter().collect(),
        }
    }
}

impl Tracked for UsageCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn holders(&self) -> &AtomicUsize {
        &self.holders
    }

    fn slot(registry: &RegistryInner) -> &RwLock<HashMap<String, Arc<Self>>> {
        &registry.usage_counters
    }

    fn unregister(&self, _registry: &RegistryInner) {}
}

impl IntervalCounter for Handle<UsageCounter> {
    fn update(&self, key: &str, at: SystemTime, amount: u64) {
        self.shared.record(key, at, amount);
    }

    fn dispose(&self) {
        self.release();
    }
}
