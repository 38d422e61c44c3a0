//! Xgress Module
//!
//! Session data payloads, the flows they belong to, and the hook for
//! observing them.

pub mod codec;
pub mod handler;
pub mod types;

pub use codec::{PayloadDecodeError, PayloadEncodeError, PAYLOAD_FRAME_OVERHEAD};
pub use handler::PeekHandler;
pub use types::{Flow, Originator, Payload, SessionFlow, PAYLOAD_FLAG_SESSION_END};
