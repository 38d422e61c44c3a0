//! Payload usage accounting shared by link taps

use std::time::SystemTime;
use tracing::error;

use super::Direction;
use crate::channel::Message;
use crate::metrics::IntervalCounter;
use crate::xgress::{Payload, PayloadDecodeError};

/// Session and data size carried by one payload frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadUsage {
    pub session_id: String,
    pub data_len: u64,
}

/// Interpret a message body as a payload frame
pub fn payload_usage(message: &Message) -> Result<PayloadUsage, PayloadDecodeError> {
    let payload = Payload::decode(message)?;
    Ok(PayloadUsage {
        data_len: payload.data_len(),
        session_id: payload.session_id,
    })
}

/// Charge the data carried by a payload message to its session.
///
/// Messages of any other content type are ignored. Decode failures are logged
/// and otherwise dropped.
pub fn record_payload_usage(
    counter: &dyn IntervalCounter,
    message: &Message,
    link_id: &str,
    direction: Direction,
) {
    if !message.is_payload() {
        return;
    }

    match payload_usage(message) {
        Ok(usage) => counter.update(&usage.session_id, SystemTime::now(), usage.data_len),
        Err(e) => {
            error!(
                link_id = %link_id,
                direction = %direction,
                body_len = message.body.len(),
                error = %e,
                "Failed to unmarshal payload"
            );
        }
    }
}
