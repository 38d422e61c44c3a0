//! fabric-peek
//!
//! Data-plane metrics taps for a message fabric.
//!
//! A [`TransportPeekTap`] watches one link and records byte rates, message
//! rates and message sizes for the link and for the whole process, charging
//! decoded payload frames to their session's usage. A [`SessionPeekTap`]
//! watches the xgress layer and records the same shapes split into ingress
//! and egress traffic. Both only observe: they never alter, delay or fail the
//! traffic they see.

pub mod channel;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod peek;
pub mod xgress;

pub use config::Config;
pub use metrics::{MetricsRegistry, Registry};
pub use peek::{SessionPeekTap, SharedTransportMetrics, TransportPeekTap};

/// Common error type for setup and reporting paths
pub type Result<T> = anyhow::Result<T>;
