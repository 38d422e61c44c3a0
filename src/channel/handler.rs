//! Channel Peek Hook

use super::Message;

/// Passive observer of every message crossing a link.
///
/// Implementations must not block and must not fail: they are called inline
/// on the link's I/O path, possibly from several threads at once.
pub trait PeekHandler: Send + Sync {
    /// The link connected to `remote_addr`
    fn connect(&self, remote_addr: &str);

    /// A message was received on the link
    fn rx(&self, message: &Message);

    /// A message was sent on the link
    fn tx(&self, message: &Message);

    /// The link closed; no further events follow
    fn close(&self);
}
