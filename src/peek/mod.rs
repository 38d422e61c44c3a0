//! Peek Taps
//!
//! Passive observers that turn link and xgress traffic into rate meters,
//! size histograms and per-session usage.

pub mod session;
pub mod transport;
pub mod usage;

pub use session::{SessionPeekTap, TrafficClass};
pub use transport::{SharedTransportMetrics, TransportPeekTap};
pub use usage::{payload_usage, record_payload_usage, PayloadUsage};

use crate::metrics::{Histogram, Meter, Registry};
use std::fmt;
use std::sync::Arc;

/// Direction of traffic relative to the local process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rx => "rx",
            Direction::Tx => "tx",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte rate, message rate and message size for one direction of one scope
pub struct DirectionMetrics {
    bytes: Arc<dyn Meter>,
    messages: Arc<dyn Meter>,
    sizes: Arc<dyn Histogram>,
}

impl DirectionMetrics {
    /// Register `<prefix>.bytesrate`, `<prefix>.msgrate` and `<prefix>.msgsize`
    pub fn new(registry: &dyn Registry, prefix: &str) -> Self {
        Self {
            bytes: registry.meter(&format!("{}.bytesrate", prefix)),
            messages: registry.meter(&format!("{}.msgrate", prefix)),
            sizes: registry.histogram(&format!("{}.msgsize", prefix)),
        }
    }

    /// Account for one message of `size` bytes
    pub fn record(&self, size: u64) {
        self.messages.mark(1);
        self.bytes.mark(size);
        self.sizes.update(size);
    }

    pub fn dispose(&self) {
        self.bytes.dispose();
        self.messages.dispose();
        self.sizes.dispose();
    }
}

/// Both directions of one scope, named `<scope>.{tx,rx}.*`
pub struct TrafficMetrics {
    tx: DirectionMetrics,
    rx: DirectionMetrics,
}

impl TrafficMetrics {
    pub fn new(registry: &dyn Registry, scope: &str) -> Self {
        Self {
            tx: DirectionMetrics::new(registry, &format!("{}.tx", scope)),
            rx: DirectionMetrics::new(registry, &format!("{}.rx", scope)),
        }
    }

    pub fn direction(&self, direction: Direction) -> &DirectionMetrics {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    pub fn dispose(&self) {
        self.tx.dispose();
        self.rx.dispose();
    }
}
