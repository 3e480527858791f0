//! Transport seam: the radio driver as seen by the protocol core.
//!
//! The core needs three things from the radio:
//!
//! - `send`, accepted or rejected immediately; completion is reported later
//!   through [`LinkNotifier::on_send_complete`](crate::bridge::LinkNotifier::on_send_complete),
//! - received frames, pushed through
//!   [`LinkNotifier::on_receive`](crate::bridge::LinkNotifier::on_receive),
//! - a peer table that must hold an address before unicast to it works.
//!
//! Radio bring-up, channel selection and key storage stay with the
//! implementation.

mod memory;

pub use memory::{MemoryTransport, SentFrame};

use bytes::Bytes;

use crate::error::Result;
use crate::peers::PeerAddress;

/// Peer-table entry handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub address: PeerAddress,
    /// Radio channel the peer listens on.
    pub channel: u8,
    /// Whether frames to the peer use the pre-shared key.
    pub encrypt: bool,
}

impl PeerInfo {
    /// Unencrypted entry on `channel`.
    pub fn new(address: PeerAddress, channel: u8) -> Self {
        Self {
            address,
            channel,
            encrypt: false,
        }
    }
}

/// Result of a peer-table insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added,
    AlreadyExists,
}

/// Radio driver operations used by the protocol core.
///
/// Calls are synchronous and must not block: the driver only queues the
/// frame. Implementations are shared between tasks behind an `Arc`.
pub trait Transport: Send + Sync + 'static {
    /// Queue `frame` for `dest`.
    ///
    /// Returns [`SendRejected`](crate::RadiowireError::SendRejected) if the
    /// driver refuses the frame.
    fn send(&self, dest: &PeerAddress, frame: Bytes) -> Result<()>;

    /// Check if `address` is in the driver's peer table.
    fn has_peer(&self, address: &PeerAddress) -> bool;

    /// Add a peer-table entry.
    ///
    /// Returns [`TransportNotReady`](crate::RadiowireError::TransportNotReady)
    /// if the table cannot be modified yet.
    fn register_peer(&self, peer: PeerInfo) -> Result<RegisterOutcome>;
}
