//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::metrics::collector::DEFAULT_HISTOGRAM_BUCKETS;
use crate::metrics::DEFAULT_USAGE_INTERVAL;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub with_thread_ids: bool,
    pub ansi: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Bucket width of the usage interval counters
    #[serde(with = "humantime_serde")]
    pub usage_interval: Duration,
    /// Prometheus namespace prepended to exported metric names
    pub namespace: Option<String>,
    /// Message size histogram buckets, in bytes
    pub histogram_buckets: Vec<f64>,
    /// Record per-link metrics in transport taps
    pub link_metrics: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_thread_ids: true,
            ansi: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            usage_interval: DEFAULT_USAGE_INTERVAL,
            namespace: None,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
            link_metrics: true,
        }
    }
}
