//! Metrics Types
//!
//! Handle and factory contracts the peek taps are written against.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use serde::{Deserialize, Serialize};

/// Default bucket width for usage interval counters
pub const DEFAULT_USAGE_INTERVAL: Duration = Duration::from_secs(60);

/// Rate of discrete events or bytes
pub trait Meter: Send + Sync {
    fn mark(&self, n: u64);

    /// Release this handle from the registry that created it
    fn dispose(&self);
}

/// Distribution of observed sizes
pub trait Histogram: Send + Sync {
    fn update(&self, value: u64);

    fn dispose(&self);
}

/// Cumulative per-key amounts bucketed into fixed time intervals
pub trait IntervalCounter: Send + Sync {
    fn update(&self, key: &str, at: SystemTime, amount: u64);

    fn dispose(&self);
}

/// Factory for named metric handles.
///
/// Names are dotted hierarchical strings such as `fabric.tx.bytesrate` or
/// `link.<id>.rx.msgsize`. Whether two calls with the same name share state is
/// up to the implementation.
pub trait Registry: Send + Sync {
    fn meter(&self, name: &str) -> Arc<dyn Meter>;

    fn histogram(&self, name: &str) -> Arc<dyn Histogram>;

    fn interval_counter(&self, name: &str, interval: Duration) -> Arc<dyn IntervalCounter>;
}

/// Point-in-time view of a meter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub name: String,
    pub count: u64,
    /// Events per second since the meter was created
    pub mean_rate: f64,
}

/// Point-in-time view of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub name: String,
    pub count: u64,
    pub sum: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl HistogramSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// One completed interval of an interval counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageInterval {
    pub counter: String,
    /// Unix timestamp (seconds) of the bucket start
    pub interval_start: u64,
    pub interval_secs: u64,
    pub values: std::collections::BTreeMap<String, u64>,
}

impl UsageInterval {
    pub fn total(&self) -> u64 {
        self.values.values().sum()
    }
}
