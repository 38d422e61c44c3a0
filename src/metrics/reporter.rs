//! Metrics Reporter
//!
//! Drains completed usage intervals into reports

use super::{MetricsRegistry, UsageInterval};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Session usage report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub report_id: String,
    pub generated_at: u64, // Unix timestamp
    pub summary: ReportSummary,
    pub intervals: Vec<UsageInterval>,
}

/// Report summary statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub interval_count: u64,
    pub unique_sessions: u64,
    pub total_bytes: u64,
}

/// Builds usage reports from a registry's interval counters
pub struct UsageReporter {
    registry: Arc<MetricsRegistry>,
}

impl UsageReporter {
    /// Create a new reporter
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Drain every interval completed before `now` into a report
    pub fn collect(&self, now: SystemTime) -> anyhow::Result<UsageReport> {
        let intervals = self.registry.flush_usage(now);
        self.build(now, intervals)
    }

    /// Drain every interval, open ones included, into a final report
    pub fn collect_final(&self, now: SystemTime) -> anyhow::Result<UsageReport> {
        let intervals = self.registry.drain_usage();
        self.build(now, intervals)
    }

    fn build(&self, now: SystemTime, intervals: Vec<UsageInterval>) -> anyhow::Result<UsageReport> {
        let report_id = uuid::Uuid::new_v4().to_string();
        let generated_at = now.duration_since(UNIX_EPOCH)?.as_secs();
        let summary = summarize(&intervals);

        info!(
            report_id = %report_id,
            intervals = summary.interval_count,
            sessions = summary.unique_sessions,
            total_bytes = summary.total_bytes,
            "Usage report generated"
        );

        Ok(UsageReport {
            report_id,
            generated_at,
            summary,
            intervals,
        })
    }
}

fn summarize(intervals: &[UsageInterval]) -> ReportSummary {
    let sessions: BTreeSet<&str> = intervals.iter()
        .flat_map(|interval| interval.values.keys().map(String::as_str))
        .collect();

    let summary = ReportSummary {
        interval_count: intervals.len() as u64,
        unique_sessions: sessions.len() as u64,
        total_bytes: intervals.iter().map(UsageInterval::total).sum(),
    };
    debug!(?summary, "Summarized usage intervals");
    summary
}

/// Export usage report to JSON format
pub fn export_report_json(report: &UsageReport) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| anyhow::anyhow!("Failed to serialize report to JSON: {}", e))
}

/// Export usage report to CSV format, one row per counter, interval and session
pub fn export_report_csv(report: &UsageReport) -> anyhow::Result<String> {
    let mut csv = String::new();

    csv.push_str("Report ID,Counter,Interval Start,Interval Seconds,Session,Bytes\n");

    for interval in &report.intervals {
        for (session, bytes) in &interval.values {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                report.report_id,
                interval.counter,
                interval.interval_start,
                interval.interval_secs,
                session,
                bytes
            ));
        }
    }

    Ok(csv)
}
