//! Link Peek Tap

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::{record_payload_usage, Direction, TrafficMetrics};
use crate::channel::{Message, PeekHandler};
use crate::config::MetricsConfig;
use crate::metrics::{IntervalCounter, Registry, DEFAULT_USAGE_INTERVAL};

/// Metrics shared by every link in the process: `fabric.{tx,rx}.*` and the
/// `usage.fabric.{rx,tx}` interval counters.
///
/// Taps never dispose these.
pub struct SharedTransportMetrics {
    traffic: TrafficMetrics,
    usage_rx: Arc<dyn IntervalCounter>,
    usage_tx: Arc<dyn IntervalCounter>,
}

impl SharedTransportMetrics {
    pub fn new(registry: &dyn Registry) -> Self {
        Self::with_usage_interval(registry, DEFAULT_USAGE_INTERVAL)
    }

    pub fn with_usage_interval(registry: &dyn Registry, interval: Duration) -> Self {
        Self {
            traffic: TrafficMetrics::new(registry, "fabric"),
            usage_rx: registry.interval_counter("usage.fabric.rx", interval),
            usage_tx: registry.interval_counter("usage.fabric.tx", interval),
        }
    }

    pub fn from_config(registry: &dyn Registry, config: &MetricsConfig) -> Self {
        Self::with_usage_interval(registry, config.usage_interval)
    }

    fn usage(&self, direction: Direction) -> &dyn IntervalCounter {
        match direction {
            Direction::Rx => self.usage_rx.as_ref(),
            Direction::Tx => self.usage_tx.as_ref(),
        }
    }
}

/// Peek tap for a single link.
///
/// Records every message into the link's own `link.<id>.{tx,rx}.*` metrics
/// and into the process-wide [`SharedTransportMetrics`], and charges payload
/// frames to their session's usage.
///
/// `close` disposes the link metrics exactly once. Events arriving after
/// `close` has returned skip the link metrics, but the check is not atomic
/// with the update: callers must stop delivering events for a link before
/// closing it. An event racing with `close` can reach a handle that is being
/// disposed; the registry tolerates that, the update is just lost.
pub struct TransportPeekTap {
    link_id: String,
    shared: Arc<SharedTransportMetrics>,
    link: Option<TrafficMetrics>,
    closed: AtomicBool,
}

impl TransportPeekTap {
    /// Create a tap that registers its own handle to the shared metrics
    pub fn new(link_id: impl Into<String>, registry: &dyn Registry) -> Self {
        let shared = Arc::new(SharedTransportMetrics::new(registry));
        Self::with_shared(link_id, shared, registry)
    }

    /// Create a tap recording into an existing shared metric group
    pub fn with_shared(
        link_id: impl Into<String>,
        shared: Arc<SharedTransportMetrics>,
        registry: &dyn Registry,
    ) -> Self {
        let link_id = link_id.into();
        let link = TrafficMetrics::new(registry, &format!("link.{}", link_id));
        debug!(link_id = %link_id, "Created link peek tap");

        Self {
            link_id,
            shared,
            link: Some(link),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a tap that records only the shared metrics
    pub fn without_link_metrics(
        link_id: impl Into<String>,
        shared: Arc<SharedTransportMetrics>,
    ) -> Self {
        Self {
            link_id: link_id.into(),
            shared,
            link: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a tap honouring `metrics.link_metrics`
    pub fn from_config(
        link_id: impl Into<String>,
        shared: Arc<SharedTransportMetrics>,
        registry: &dyn Registry,
        config: &MetricsConfig,
    ) -> Self {
        if config.link_metrics {
            Self::with_shared(link_id, shared, registry)
        } else {
            Self::without_link_metrics(link_id, shared)
        }
    }

    pub fn link_id(&self) -> &str {
        &self.link_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn observe(&self, direction: Direction, message: &Message) {
        let size = message.body_len();

        if let Some(link) = &self.link {
            if self.is_closed() {
                trace!(
                    link_id = %self.link_id,
                    %direction,
                    "Message after link close, skipping link metrics"
                );
            } else {
                link.direction(direction).record(size);
            }
        }
        self.shared.traffic.direction(direction).record(size);

        record_payload_usage(self.shared.usage(direction), message, &self.link_id, direction);
    }
}

impl PeekHandler for TransportPeekTap {
    fn connect(&self, remote_addr: &str) {
        debug!(link_id = %self.link_id, remote_addr = %remote_addr, "Link connected");
    }

    fn rx(&self, message: &Message) {
        self.observe(Direction::Rx, message);
    }

    fn tx(&self, message: &Message) {
        self.observe(Direction::Tx, message);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(link) = &self.link {
            link.dispose();
            debug!(link_id = %self.link_id, "Disposed link metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::constants::{CONTENT_TYPE_CONTROL, CONTENT_TYPE_PAYLOAD};
    use crate::metrics::MetricsRegistry;
    use crate::xgress::Payload;

    fn count(registry: &MetricsRegistry, name: &str) -> Option<u64> {
        registry.meter_snapshot(name).map(|snapshot| snapshot.count)
    }

    #[test]
    fn test_rx_totals() {
        let registry = MetricsRegistry::new();
        let tap = TransportPeekTap::new("l1", &registry);

        let sizes = [10usize, 0, 250, 4096];
        for size in sizes {
            tap.rx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; size]));
        }

        let total: u64 = sizes.iter().map(|s| *s as u64).sum();
        for scope in ["link.l1", "fabric"] {
            assert_eq!(count(&registry, &format!("{}.rx.bytesrate", scope)), Some(total));
            assert_eq!(count(&registry, &format!("{}.rx.msgrate", scope)), Some(4));
            let sizes = registry.histogram_snapshot(&format!("{}.rx.msgsize", scope)).unwrap();
            assert_eq!(sizes.count, 4);
            assert_eq!(sizes.sum, total);
            assert_eq!(sizes.max, Some(4096));
            assert_eq!(count(&registry, &format!("{}.tx.msgrate", scope)), Some(0));
        }
    }

    #[test]
    fn test_link_and_payload_scenario() {
        let registry = MetricsRegistry::new();
        let tap = TransportPeekTap::new("L1", &registry);
        tap.connect("tls:10.0.0.2:6000");

        tap.rx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 100]));
        let payload = Payload::new("S1", vec![0u8; 40]).encode().unwrap();
        assert_eq!(payload.body.len(), 50);
        tap.tx(&payload);

        assert_eq!(count(&registry, "link.L1.rx.bytesrate"), Some(100));
        assert_eq!(count(&registry, "link.L1.tx.bytesrate"), Some(50));

        let usage_tx = registry.usage_counter("usage.fabric.tx").unwrap();
        assert_eq!(usage_tx.keys(), vec!["S1".to_string()]);
        assert_eq!(usage_tx.total_for("S1"), 40);
        assert!(registry.usage_counter("usage.fabric.rx").unwrap().keys().is_empty());
    }

    #[test]
    fn test_malformed_payload_still_counted() {
        let registry = MetricsRegistry::new();
        let tap = TransportPeekTap::new("l2", &registry);

        tap.rx(&Message::new(CONTENT_TYPE_PAYLOAD, vec![0u8, 30, b'x']));

        assert_eq!(count(&registry, "link.l2.rx.bytesrate"), Some(3));
        assert_eq!(count(&registry, "link.l2.rx.msgrate"), Some(1));
        assert_eq!(count(&registry, "fabric.rx.bytesrate"), Some(3));
        assert_eq!(registry.histogram_snapshot("fabric.rx.msgsize").unwrap().count, 1);
        assert!(registry.usage_counter("usage.fabric.rx").unwrap().keys().is_empty());
    }

    #[test]
    fn test_close_disposes_link_metrics_only() {
        let registry = MetricsRegistry::new();
        let tap = TransportPeekTap::new("l3", &registry);
        tap.rx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 8]));

        tap.close();
        assert!(tap.is_closed());

        let names = registry.metric_names();
        assert!(names.iter().all(|name| !name.starts_with("link.l3.")));
        assert_eq!(names.len(), 8);
        assert_eq!(count(&registry, "fabric.rx.bytesrate"), Some(8));
        assert!(registry.usage_counter("usage.fabric.rx").is_some());

        // Late events only reach the shared metrics
        tap.rx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 2]));
        assert_eq!(count(&registry, "fabric.rx.bytesrate"), Some(10));
        assert!(!registry.contains("link.l3.rx.bytesrate"));

        tap.close();
    }

    #[test]
    fn test_shared_metrics_outlive_links() {
        let registry = MetricsRegistry::new();
        let shared = Arc::new(SharedTransportMetrics::new(&registry));
        let first = TransportPeekTap::with_shared("a", shared.clone(), &registry);
        let second = TransportPeekTap::with_shared("b", shared, &registry);

        first.tx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 5]));
        second.tx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 7]));
        first.close();
        second.tx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 1]));

        assert_eq!(count(&registry, "fabric.tx.bytesrate"), Some(13));
        assert_eq!(count(&registry, "link.b.tx.bytesrate"), Some(8));
        assert_eq!(count(&registry, "link.a.tx.bytesrate"), None);
    }

    #[test]
    fn test_reconnect_keeps_metrics_after_old_close() {
        let registry = MetricsRegistry::new();
        let shared = Arc::new(SharedTransportMetrics::new(&registry));
        let old = TransportPeekTap::with_shared("L5", shared.clone(), &registry);
        let new = TransportPeekTap::with_shared("L5", shared, &registry);

        old.rx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 4]));
        old.close();
        new.rx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 6]));

        assert_eq!(count(&registry, "link.L5.rx.bytesrate"), Some(10));
        assert_eq!(registry.histogram_snapshot("link.L5.rx.msgsize").unwrap().count, 2);

        new.close();
        assert!(registry.metric_names().iter().all(|name| !name.starts_with("link.L5.")));
    }

    #[test]
    fn test_link_metrics_disabled() {
        let registry = MetricsRegistry::new();
        let config = MetricsConfig {
            link_metrics: false,
            usage_interval: Duration::from_secs(300),
            ..MetricsConfig::default()
        };
        let shared = Arc::new(SharedTransportMetrics::from_config(&registry, &config));
        let tap = TransportPeekTap::from_config("quiet", shared, &registry, &config);

        tap.rx(&Payload::new("s", vec![0u8; 3]).encode().unwrap());
        tap.close();

        assert!(registry.metric_names().iter().all(|name| !name.starts_with("link.")));
        let usage = registry.usage_counter("usage.fabric.rx").unwrap();
        assert_eq!(usage.interval(), Duration::from_secs(300));
        assert_eq!(usage.total_for("s"), 3);
    }
}
