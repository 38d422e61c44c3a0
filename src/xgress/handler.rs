//! Xgress Peek Hook

use super::{Flow, Payload};

/// Passive observer of payloads moving through the xgress layer.
///
/// Called inline for every payload; implementations must not block.
pub trait PeekHandler: Send + Sync {
    /// A payload was received for `flow`
    fn rx(&self, flow: &dyn Flow, payload: &Payload);

    /// A payload was sent for `flow`
    fn tx(&self, flow: &dyn Flow, payload: &Payload);

    /// `flow` closed
    fn close(&self, flow: &dyn Flow);
}
