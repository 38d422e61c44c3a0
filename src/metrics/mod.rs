//! Metrics Module
//!
//! Metric handle contracts and the in-process registry that implements them.

pub mod collector;
pub mod types;
pub mod reporter;

pub use collector::{MetricsRegistry, UsageCounter};
pub use reporter::{
    export_report_csv, export_report_json, ReportSummary, UsageReport, UsageReporter,
};
pub use types::{
    Histogram, HistogramSnapshot, IntervalCounter, Meter, MeterSnapshot, Registry,
    UsageInterval, DEFAULT_USAGE_INTERVAL,
};
