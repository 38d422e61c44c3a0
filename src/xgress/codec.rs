//! Payload Frame Codec
//!
//! A payload travels over a link as a message of content type
//! `CONTENT_TYPE_PAYLOAD` whose body is laid out big-endian as:
//!
//! ```text
//! u16 session id length | session id (UTF-8) | u32 sequence | u16 flags | data
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use super::Payload;
use crate::channel::constants::CONTENT_TYPE_PAYLOAD;
use crate::channel::Message;

/// Bytes of framing around the session id and data
pub const PAYLOAD_FRAME_OVERHEAD: usize = 2 + 4 + 2;

/// Errors decoding a message body as a payload frame
#[derive(Debug, Error, PartialEq)]
pub enum PayloadDecodeError {
    #[error("content type {found} is not a payload")]
    WrongContentType { found: i32 },
    #[error("payload frame truncated: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },
    #[error("payload frame has an empty session id")]
    EmptySessionId,
    #[error("payload session id is not valid UTF-8: {0}")]
    InvalidSessionId(#[from] std::str::Utf8Error),
}

/// Errors encoding a payload frame
#[derive(Debug, Error, PartialEq)]
pub enum PayloadEncodeError {
    #[error("session id is empty")]
    EmptySessionId,
    #[error("session id of {len} bytes exceeds the frame limit of {max}")]
    SessionIdTooLong { len: usize, max: usize },
}

impl Payload {
    /// Decode a payload from a link message
    pub fn decode(message: &Message) -> Result<Self, PayloadDecodeError> {
        if !message.is_payload() {
            return Err(PayloadDecodeError::WrongContentType { found: message.content_type });
        }

        let available = message.body.len();
        if available < 2 {
            return Err(PayloadDecodeError::Truncated { needed: 2, available });
        }

        let mut buf = message.body.clone();
        let session_id_len = buf.get_u16() as usize;
        if session_id_len == 0 {
            return Err(PayloadDecodeError::EmptySessionId);
        }

        let needed = session_id_len + PAYLOAD_FRAME_OVERHEAD;
        if available < needed {
            return Err(PayloadDecodeError::Truncated { needed, available });
        }

        let session_id = std::str::from_utf8(&buf.split_to(session_id_len))?.to_string();
        let sequence = buf.get_u32();
        let flags = buf.get_u16();

        Ok(Self {
            session_id,
            sequence,
            flags,
            data: buf,
        })
    }

    /// Encode this payload as a link message
    pub fn encode(&self) -> Result<Message, PayloadEncodeError> {
        let session_id = self.session_id.as_bytes();
        if session_id.is_empty() {
            return Err(PayloadEncodeError::EmptySessionId);
        }
        let session_id_len = u16::try_from(session_id.len()).map_err(|_| {
            PayloadEncodeError::SessionIdTooLong { len: session_id.len(), max: u16::MAX as usize }
        })?;

        let capacity = PAYLOAD_FRAME_OVERHEAD + session_id.len() + self.data.len();
        let mut body = BytesMut::with_capacity(capacity);
        body.put_u16(session_id_len);
        body.put_slice(session_id);
        body.put_u32(self.sequence);
        body.put_u16(self.flags);
        body.put_slice(&self.data);

        Ok(Message::new(CONTENT_TYPE_PAYLOAD, body.freeze()))
    }
}
