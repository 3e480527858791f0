//! In-process transport.
//!
//! Records every accepted frame instead of putting it on the air, keeps a
//! peer table with the same rules as the radio driver (unicast needs a
//! registered peer) and, once a [`LinkNotifier`] is attached, reports send
//! completion and injected receptions through the bridge.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use radiowire::peers::PeerAddress;
//! use radiowire::transport::{MemoryTransport, PeerInfo, Transport};
//!
//! let transport = MemoryTransport::new();
//! let peer = PeerAddress::new([0x24, 0x6f, 0x28, 0, 0, 1]);
//!
//! assert!(transport.send(&peer, Bytes::from_static(b"hi")).is_err());
//! transport.register_peer(PeerInfo::new(peer, 1)).unwrap();
//! transport.send(&peer, Bytes::from_static(b"hi")).unwrap();
//! assert_eq!(transport.sent_to(&peer).len(), 1);
//! ```

use bytes::Bytes;
use parking_lot::Mutex;

use super::{PeerInfo, RegisterOutcome, Transport};
use crate::bridge::{LinkNotifier, SendOutcome, WeakLinkNotifier};
use crate::error::{RadiowireError, Result};
use crate::peers::PeerAddress;

/// A frame accepted by [`MemoryTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub dest: PeerAddress,
    pub bytes: Bytes,
}

#[derive(Debug)]
struct State {
    peers: Vec<PeerInfo>,
    sent: Vec<SentFrame>,
    reject_sends: bool,
    ready: bool,
}

/// Transport that keeps frames in memory.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<State>,
    notifier: Mutex<Option<WeakLinkNotifier>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                peers: Vec::new(),
                sent: Vec::new(),
                reject_sends: false,
                ready: true,
            }),
            notifier: Mutex::new(None),
        }
    }

    /// Report send completion and injected frames through `notifier`.
    ///
    /// Only a weak handle is kept, so attaching does not keep the bridge
    /// open after the node lets go of it.
    pub fn attach(&self, notifier: LinkNotifier) {
        *self.notifier.lock() = Some(notifier.downgrade());
    }

    fn notifier(&self) -> Option<LinkNotifier> {
        self.notifier.lock().as_ref().and_then(WeakLinkNotifier::upgrade)
    }

    /// Make every following send fail with `SendRejected`.
    pub fn set_reject_sends(&self, reject: bool) {
        self.state.lock().reject_sends = reject;
    }

    /// Make peer registration fail with `TransportNotReady`.
    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    /// All accepted frames, oldest first.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.lock().sent.clone()
    }

    /// Accepted frames addressed to `dest`.
    pub fn sent_to(&self, dest: &PeerAddress) -> Vec<Bytes> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|frame| frame.dest == *dest)
            .map(|frame| frame.bytes.clone())
            .collect()
    }

    /// Remove and return the accepted frames.
    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Current peer table.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.state.lock().peers.clone()
    }

    /// Simulate a frame arriving from `from`.
    ///
    /// Fails with `ChannelClosed` if no notifier is attached.
    pub async fn inject(&self, from: PeerAddress, data: &[u8], rssi: i8) -> Result<()> {
        let notifier = self.notifier().ok_or(RadiowireError::ChannelClosed)?;
        notifier.on_receive(from, data, rssi).await
    }

    fn report_completion(&self, dest: PeerAddress) {
        let Some(notifier) = self.notifier() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(peer = %dest, "No runtime, send completion not reported");
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = notifier.on_send_complete(dest, SendOutcome::Success).await {
                tracing::debug!(peer = %dest, error = %e, "Send completion not delivered");
            }
        });
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, dest: &PeerAddress, frame: Bytes) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.reject_sends {
                return Err(RadiowireError::SendRejected {
                    address: *dest,
                    reason: "driver refused frame".to_string(),
                });
            }
            if !state.peers.iter().any(|p| p.address == *dest) {
                return Err(RadiowireError::SendRejected {
                    address: *dest,
                    reason: "peer not registered".to_string(),
                });
            }
            state.sent.push(SentFrame {
                dest: *dest,
                bytes: frame,
            });
        }
        self.report_completion(*dest);
        Ok(())
    }

    fn has_peer(&self, address: &PeerAddress) -> bool {
        self.state.lock().peers.iter().any(|p| p.address == *address)
    }

    fn register_peer(&self, peer: PeerInfo) -> Result<RegisterOutcome> {
        let mut state = self.state.lock();
        if !state.ready {
            return Err(RadiowireError::TransportNotReady);
        }
        if state.peers.iter().any(|p| p.address == peer.address) {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        state.peers.push(peer);
        Ok(RegisterOutcome::Added)
    }
}
