//! Xgress Types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marks the last payload of a session
pub const PAYLOAD_FLAG_SESSION_END: u16 = 0x1;

/// Which side created a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Originator {
    Initiator,
    Acceptor,
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Originator::Initiator => write!(f, "initiator"),
            Originator::Acceptor => write!(f, "acceptor"),
        }
    }
}

/// One end of a session's data path, as seen by the xgress layer
pub trait Flow: Send + Sync {
    fn originator(&self) -> Originator;

    fn session_token(&self) -> &str;
}

/// Plain flow description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFlow {
    pub session_token: String,
    pub originator: Originator,
    pub address: Option<String>,
}

impl SessionFlow {
    pub fn new(session_token: impl Into<String>, originator: Originator) -> Self {
        Self {
            session_token: session_token.into(),
            originator,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

impl Flow for SessionFlow {
    fn originator(&self) -> Originator {
        self.originator
    }

    fn session_token(&self) -> &str {
        &self.session_token
    }
}

/// A chunk of application data belonging to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub session_id: String,
    pub sequence: u32,
    pub flags: u16,
    pub data: Bytes,
}

impl Payload {
    pub fn new(session_id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            session_id: session_id.into(),
            sequence: 0,
            flags: 0,
            data: data.into(),
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn data_len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_session_end(&self) -> bool {
        self.flags & PAYLOAD_FLAG_SESSION_END != 0
    }
}
