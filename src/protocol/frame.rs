//! Frame encoding and decoding.
//!
//! Frames are built on demand for every send and never kept around. The
//! payload of a decoded frame is a `bytes::Bytes` view into the received
//! buffer, so decoding does not copy.
//!
//! # Example
//!
//! ```
//! use radiowire::protocol::{decode_frame, encode_frame, FrameType, SequenceCounters, MAX_FRAME_LEN};
//!
//! let counters = SequenceCounters::new();
//! let bytes = encode_frame(FrameType::Unicast, 0, 42, b"hello", &counters, MAX_FRAME_LEN).unwrap();
//!
//! let frame = decode_frame(&bytes).unwrap();
//! assert_eq!(frame.magic, 42);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use std::sync::atomic::{AtomicU16, Ordering};

use bytes::Bytes;

use super::wire_format::{
    compute_integrity, store_integrity, stored_integrity, FrameType, Header, HEADER_SIZE,
    MAX_FRAME_LEN,
};
use crate::error::{RadiowireError, Result};
use crate::peers::PeerAddress;

/// Per-type sequence counters.
///
/// Shared by every component that sends frames, so that sequence numbers
/// stay monotonic per type across the whole node.
#[derive(Debug, Default)]
pub struct SequenceCounters {
    counters: [AtomicU16; 2],
}

impl SequenceCounters {
    /// Create counters starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create counters starting at the given values (broadcast, unicast).
    pub fn starting_at(broadcast: u16, unicast: u16) -> Self {
        Self {
            counters: [AtomicU16::new(broadcast), AtomicU16::new(unicast)],
        }
    }

    /// Take the sequence number for the next frame of this type.
    ///
    /// Post-increments, wrapping modulo 2^16.
    #[inline]
    pub fn next(&self, frame_type: FrameType) -> u16 {
        self.counters[frame_type.index()].fetch_add(1, Ordering::AcqRel)
    }

    /// Peek at the value the next frame of this type will carry.
    #[inline]
    pub fn peek(&self, frame_type: FrameType) -> u16 {
        self.counters[frame_type.index()].load(Ordering::Acquire)
    }
}

/// Pick the frame type for a destination address.
#[inline]
pub fn frame_type_for(dest: &PeerAddress) -> FrameType {
    if dest.is_broadcast() {
        FrameType::Broadcast
    } else {
        FrameType::Unicast
    }
}

/// A successfully decoded and verified frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Broadcast or unicast.
    pub frame_type: FrameType,
    /// Opaque command/status byte.
    pub state: u8,
    /// Sender's per-type sequence number.
    pub sequence: u16,
    /// Opaque command tag.
    pub magic: u32,
    /// Everything after the header (zero-copy view).
    pub payload: Bytes,
}

impl DecodedFrame {
    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check if this is a broadcast frame.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.frame_type == FrameType::Broadcast
    }

    /// Payload as text, up to the first NUL byte.
    ///
    /// Peers send NUL-terminated strings; invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }
}

/// Encode a frame with a binary payload.
///
/// The payload is truncated to `max_length - HEADER_SIZE` bytes if it does
/// not fit. The sequence number is taken from `counters` for this type.
///
/// # Panics
///
/// Panics if `max_length` is smaller than `HEADER_SIZE`.
pub fn encode_frame(
    frame_type: FrameType,
    state: u8,
    magic: u32,
    payload: &[u8],
    counters: &SequenceCounters,
    max_length: usize,
) -> Result<Bytes> {
    assert!(
        max_length >= HEADER_SIZE,
        "max_length {} is smaller than the {}-byte header",
        max_length,
        HEADER_SIZE
    );

    let room = max_length - HEADER_SIZE;
    let body = if payload.len() > room {
        tracing::warn!(
            len = payload.len(),
            room,
            "Payload does not fit in frame, truncating"
        );
        &payload[..room]
    } else {
        payload
    };

    assemble(frame_type, state, magic, &[body], counters)
}

/// Encode a frame with a text payload.
///
/// The text is truncated to leave room for a terminating NUL byte, which is
/// always written.
///
/// # Panics
///
/// Panics if `max_length` cannot hold the header plus the terminator.
pub fn encode_text_frame(
    frame_type: FrameType,
    state: u8,
    magic: u32,
    text: &str,
    counters: &SequenceCounters,
    max_length: usize,
) -> Result<Bytes> {
    assert!(
        max_length > HEADER_SIZE,
        "max_length {} leaves no room for a text terminator",
        max_length
    );

    let room = max_length - HEADER_SIZE - 1;
    let bytes = text.as_bytes();
    let body = if bytes.len() > room {
        tracing::warn!(len = bytes.len(), room, "Text does not fit in frame, truncating");
        &bytes[..room]
    } else {
        bytes
    };

    let terminator: &[u8] = &[0];
    assemble(frame_type, state, magic, &[body, terminator], counters)
}

/// Write header and payload parts into one buffer and seal it with the CRC.
fn assemble(
    frame_type: FrameType,
    state: u8,
    magic: u32,
    parts: &[&[u8]],
    counters: &SequenceCounters,
) -> Result<Bytes> {
    let size = HEADER_SIZE + parts.iter().map(|p| p.len()).sum::<usize>();

    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| RadiowireError::AllocationFailure { size })?;

    let header = Header::new(frame_type, state, counters.next(frame_type), magic);
    buf.extend_from_slice(&header.encode());
    for part in parts {
        buf.extend_from_slice(part);
    }

    let integrity = compute_integrity(&buf);
    store_integrity(&mut buf, integrity);

    Ok(Bytes::from(buf))
}

/// Decode and verify a received frame.
///
/// Fails with `ShortFrame` below the header size, `OversizedFrame` above
/// [`MAX_FRAME_LEN`], `IntegrityMismatch` if the CRC does not match, and
/// `UnknownFrameType` for a bad type byte.
pub fn decode_frame(bytes: &Bytes) -> Result<DecodedFrame> {
    if bytes.len() < HEADER_SIZE {
        return Err(RadiowireError::ShortFrame {
            len: bytes.len(),
            needed: HEADER_SIZE,
        });
    }
    if bytes.len() > MAX_FRAME_LEN {
        return Err(RadiowireError::OversizedFrame {
            len: bytes.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let stored = stored_integrity(bytes);
    let computed = compute_integrity(bytes);
    if stored != computed {
        return Err(RadiowireError::IntegrityMismatch { stored, computed });
    }

    let header = Header::decode(bytes)?;
    Ok(DecodedFrame {
        frame_type: header.frame_type,
        state: header.state,
        sequence: header.sequence,
        magic: header.magic,
        payload: bytes.slice(HEADER_SIZE..),
    })
}
