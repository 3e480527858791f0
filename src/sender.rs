//! Outbound frames: encode, then hand to the transport.
//!
//! [`FrameSender`] is shared by the controller and the heartbeat prober.
//! Both draw sequence numbers from the same [`SequenceCounters`], so every
//! frame of a given type leaving the node is numbered in order.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::peers::PeerAddress;
use crate::protocol::{encode_frame, encode_text_frame, frame_type_for, SequenceCounters};
use crate::transport::{PeerInfo, RegisterOutcome, Transport};

/// Cheaply cloneable handle for sending frames.
#[derive(Clone)]
pub struct FrameSender {
    transport: Arc<dyn Transport>,
    counters: Arc<SequenceCounters>,
    max_frame_len: usize,
    channel: u8,
}

impl FrameSender {
    /// Create a sender.
    ///
    /// `channel` is used for peer-table entries created by
    /// [`ensure_peer`](Self::ensure_peer).
    pub fn new(
        transport: Arc<dyn Transport>,
        counters: Arc<SequenceCounters>,
        max_frame_len: usize,
        channel: u8,
    ) -> Self {
        Self {
            transport,
            counters,
            max_frame_len,
            channel,
        }
    }

    /// Make sure the transport can unicast to `address`.
    pub fn ensure_peer(&self, address: &PeerAddress) -> Result<RegisterOutcome> {
        if self.transport.has_peer(address) {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        let outcome = self
            .transport
            .register_peer(PeerInfo::new(*address, self.channel))?;
        if outcome == RegisterOutcome::Added {
            tracing::debug!(peer = %address, channel = self.channel, "Transport peer added");
        }
        Ok(outcome)
    }

    /// Send a NUL-terminated text frame.
    pub fn send_text(&self, dest: &PeerAddress, state: u8, magic: u32, text: &str) -> Result<()> {
        let frame_type = frame_type_for(dest);
        let bytes = encode_text_frame(
            frame_type,
            state,
            magic,
            text,
            &self.counters,
            self.max_frame_len,
        )?;
        tracing::trace!(peer = %dest, %frame_type, state, magic, len = bytes.len(), "Sending text frame");
        self.transport.send(dest, bytes)
    }

    /// Send a frame with a binary payload.
    pub fn send_bytes(&self, dest: &PeerAddress, state: u8, magic: u32, payload: &[u8]) -> Result<()> {
        let frame_type = frame_type_for(dest);
        let bytes = encode_frame(
            frame_type,
            state,
            magic,
            payload,
            &self.counters,
            self.max_frame_len,
        )?;
        tracing::trace!(peer = %dest, %frame_type, state, magic, len = bytes.len(), "Sending frame");
        self.transport.send(dest, bytes)
    }

    /// The shared sequence counters.
    pub fn counters(&self) -> &Arc<SequenceCounters> {
        &self.counters
    }

    /// Largest frame this sender produces.
    #[inline]
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Radio channel used for new peer-table entries.
    #[inline]
    pub fn channel(&self) -> u8 {
        self.channel
    }
}

impl fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSender")
            .field("max_frame_len", &self.max_frame_len)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadiowireError;
    use crate::protocol::{decode_frame, FrameType, MAX_FRAME_LEN};
    use crate::transport::MemoryTransport;

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::new([0x24, 0x6F, 0x28, 0, 0, last])
    }

    fn sender_with(transport: Arc<MemoryTransport>) -> FrameSender {
        FrameSender::new(transport, Arc::new(SequenceCounters::new()), MAX_FRAME_LEN, 1)
    }

    #[test]
    fn test_ensure_peer_registers_once() {
        let transport = Arc::new(MemoryTransport::new());
        let sender = sender_with(transport.clone());

        assert_eq!(sender.ensure_peer(&addr(1)).unwrap(), RegisterOutcome::Added);
        assert_eq!(
            sender.ensure_peer(&addr(1)).unwrap(),
            RegisterOutcome::AlreadyExists
        );

        let peers = transport.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].channel, 1);
        assert!(!peers[0].encrypt);
    }

    #[test]
    fn test_ensure_peer_propagates_not_ready() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_ready(false);
        let sender = sender_with(transport);
        assert!(matches!(
            sender.ensure_peer(&addr(1)),
            Err(RadiowireError::TransportNotReady)
        ));
    }

    #[test]
    fn test_send_text_unicast() {
        let transport = Arc::new(MemoryTransport::new());
        let sender = sender_with(transport.clone());
        sender.ensure_peer(&addr(2)).unwrap();

        sender.send_text(&addr(2), 0, 77, "hello_peer").unwrap();

        let sent = transport.sent_to(&addr(2));
        assert_eq!(sent.len(), 1);
        let frame = decode_frame(&sent[0]).unwrap();
        assert_eq!(frame.frame_type, FrameType::Unicast);
        assert_eq!(frame.magic, 77);
        assert_eq!(frame.payload(), b"hello_peer\0");
        assert_eq!(frame.text(), "hello_peer");
    }

    #[test]
    fn test_send_bytes_broadcast_uses_broadcast_counter() {
        let transport = Arc::new(MemoryTransport::new());
        let sender = sender_with(transport.clone());
        sender.ensure_peer(&PeerAddress::BROADCAST).unwrap();

        sender.send_bytes(&PeerAddress::BROADCAST, 0, 1, b"a").unwrap();
        sender.send_bytes(&PeerAddress::BROADCAST, 0, 1, b"b").unwrap();

        let sent = transport.sent_to(&PeerAddress::BROADCAST);
        let first = decode_frame(&sent[0]).unwrap();
        let second = decode_frame(&sent[1]).unwrap();
        assert_eq!(first.frame_type, FrameType::Broadcast);
        assert_eq!(second.sequence, first.sequence.wrapping_add(1));
        assert_eq!(sender.counters().peek(FrameType::Unicast), 0);
    }

    #[test]
    fn test_send_without_peer_is_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let sender = sender_with(transport);
        assert!(matches!(
            sender.send_text(&addr(3), 0, 0, "x"),
            Err(RadiowireError::SendRejected { .. })
        ));
    }
}
