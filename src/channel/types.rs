//! Channel Message Types

use bytes::Bytes;
use crate::channel::constants::*;

/// A framed message travelling over a link
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub content_type: i32,
    pub body: Bytes,
}

impl Message {
    pub fn new(content_type: i32, body: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            body: body.into(),
        }
    }

    /// Size of the message body in bytes
    pub fn body_len(&self) -> u64 {
        self.body.len() as u64
    }

    /// Whether the body is an xgress payload frame
    pub fn is_payload(&self) -> bool {
        self.content_type == CONTENT_TYPE_PAYLOAD
    }
}
