//! Xgress Peek Tap

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::{Direction, TrafficMetrics};
use crate::config::MetricsConfig;
use crate::metrics::{IntervalCounter, Registry, DEFAULT_USAGE_INTERVAL};
use crate::xgress::{Flow, Originator, Payload, PeekHandler};

/// Traffic class of a session, fixed by which side created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    Ingress,
    Egress,
}

impl TrafficClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficClass::Ingress => "ingress",
            TrafficClass::Egress => "egress",
        }
    }
}

impl From<Originator> for TrafficClass {
    fn from(originator: Originator) -> Self {
        match originator {
            Originator::Initiator => TrafficClass::Ingress,
            Originator::Acceptor => TrafficClass::Egress,
        }
    }
}

struct ClassMetrics {
    traffic: TrafficMetrics,
    usage_rx: Arc<dyn IntervalCounter>,
    usage_tx: Arc<dyn IntervalCounter>,
}

impl ClassMetrics {
    fn new(registry: &dyn Registry, class: TrafficClass, interval: Duration) -> Self {
        let scope = class.as_str();
        Self {
            // Names are all lowercase; older dashboards may know the egress tx
            // message meter as `egress.tx.Msgrate`
            traffic: TrafficMetrics::new(registry, scope),
            usage_rx: registry.interval_counter(&format!("usage.{}.rx", scope), interval),
            usage_tx: registry.interval_counter(&format!("usage.{}.tx", scope), interval),
        }
    }

    fn usage(&self, direction: Direction) -> &dyn IntervalCounter {
        match direction {
            Direction::Rx => self.usage_rx.as_ref(),
            Direction::Tx => self.usage_tx.as_ref(),
        }
    }
}

/// Process-wide peek tap for the xgress layer.
///
/// Traffic on sessions created by the initiator side is recorded under
/// `ingress.*` and `usage.ingress.*`, everything else under `egress.*`, in
/// both directions. All handles live for the whole process; closing a flow
/// releases nothing.
pub struct SessionPeekTap {
    ingress: ClassMetrics,
    egress: ClassMetrics,
}

impl SessionPeekTap {
    pub fn new(registry: &dyn Registry) -> Self {
        Self::with_usage_interval(registry, DEFAULT_USAGE_INTERVAL)
    }

    pub fn with_usage_interval(registry: &dyn Registry, interval: Duration) -> Self {
        Self {
            ingress: ClassMetrics::new(registry, TrafficClass::Ingress, interval),
            egress: ClassMetrics::new(registry, TrafficClass::Egress, interval),
        }
    }

    pub fn from_config(registry: &dyn Registry, config: &MetricsConfig) -> Self {
        Self::with_usage_interval(registry, config.usage_interval)
    }

    fn class(&self, class: TrafficClass) -> &ClassMetrics {
        match class {
            TrafficClass::Ingress => &self.ingress,
            TrafficClass::Egress => &self.egress,
        }
    }

    fn observe(&self, direction: Direction, flow: &dyn Flow, payload: &Payload) {
        let size = payload.data_len();
        let metrics = self.class(TrafficClass::from(flow.originator()));

        metrics.usage(direction).update(flow.session_token(), SystemTime::now(), size);
        metrics.traffic.direction(direction).record(size);
    }
}

impl PeekHandler for SessionPeekTap {
    fn rx(&self, flow: &dyn Flow, payload: &Payload) {
        self.observe(Direction::Rx, flow, payload);
    }

    fn tx(&self, flow: &dyn Flow, payload: &Payload) {
        self.observe(Direction::Tx, flow, payload);
    }

    fn close(&self, _flow: &dyn Flow) {}
}
