//! Channel Module
//!
//! Framed messages exchanged over a link and the hook for observing them.

pub mod constants;
pub mod handler;
pub mod types;

pub use handler::PeekHandler;
pub use types::Message;
