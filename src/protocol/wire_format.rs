//! Wire format encoding and decoding.
//!
//! Implements the 10-byte header format:
//! ```text
//! ┌──────┬───────┬──────────┬───────────┬──────────┬─────────────┐
//! │ Type │ State │ Sequence │ Integrity │ Magic    │ Payload     │
//! │ 1 B  │ 1 B   │ u16 LE   │ u16 LE    │ u32 LE   │ frame len-10│
//! └──────┴───────┴──────────┴───────────┴──────────┴─────────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. The payload length is not
//! carried on the wire: the radio delivers whole frames, so it is implied by
//! the frame length.

use crc::{Crc, CRC_16_MODBUS};

use crate::error::{RadiowireError, Result};

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Largest frame the radio accepts, header included.
pub const MAX_FRAME_LEN: usize = 250;

/// Largest payload that fits in a single frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_SIZE;

/// Byte range of the integrity field inside the header.
pub const INTEGRITY_RANGE: std::ops::Range<usize> = 4..6;

/// CRC-16 with the reflected 0x8005 polynomial and an all-ones seed.
static INTEGRITY: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Command codes carried in the `state` and `magic` header fields.
pub mod codes {
    /// Plain data, also used for acknowledgments.
    pub const STATE_DATA: u8 = 0;
    /// Peer asks to be paired; answered with [`STATE_CONFIRM_PAIRING`].
    pub const STATE_PAIRING_REQUEST: u8 = 1;
    /// Pairing confirmation.
    pub const STATE_CONFIRM_PAIRING: u8 = 3;
    /// Peer requests a data frame from the controller.
    pub const STATE_REQUEST_DATA: u8 = 5;
    /// Peer asks to be added to the known list (with [`MAGIC_ADD_PEER`]).
    pub const STATE_ADD_PEER: u8 = 8;
    /// Heartbeat probe and its echo (with [`MAGIC_HEARTBEAT`]).
    pub const STATE_HEARTBEAT: u8 = 9;

    /// Magic tag qualifying [`STATE_ADD_PEER`].
    pub const MAGIC_ADD_PEER: u32 = 888_888;
    /// Magic tag qualifying [`STATE_HEARTBEAT`].
    pub const MAGIC_HEARTBEAT: u32 = 999_999;
}

/// Frame addressing mode, first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Sent to the broadcast address.
    Broadcast = 0,
    /// Sent to a single peer.
    Unicast = 1,
}

impl FrameType {
    /// Wire value of this type.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Index into per-type tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for FrameType {
    type Error = RadiowireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameType::Broadcast),
            1 => Ok(FrameType::Unicast),
            other => Err(RadiowireError::UnknownFrameType(other)),
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameType::Broadcast => f.write_str("broadcast"),
            FrameType::Unicast => f.write_str("unicast"),
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Broadcast or unicast.
    pub frame_type: FrameType,
    /// Opaque command/status byte.
    pub state: u8,
    /// Per-type sequence number.
    pub sequence: u16,
    /// CRC-16 of the frame (0 while it is being computed).
    pub integrity: u16,
    /// Opaque command tag.
    pub magic: u32,
}

impl Header {
    /// Create a new header with a zeroed integrity field.
    pub fn new(frame_type: FrameType, state: u8, sequence: u16, magic: u32) -> Self {
        Self {
            frame_type,
            state,
            sequence,
            integrity: 0,
            magic,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use radiowire::protocol::{FrameType, Header};
    ///
    /// let header = Header::new(FrameType::Unicast, 9, 7, 999_999);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 10);
    /// assert_eq!(bytes[0], 1);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (10 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.frame_type.as_u8();
        buf[1] = self.state;
        buf[2..4].copy_from_slice(&self.sequence.to_le_bytes());
        buf[INTEGRITY_RANGE].copy_from_slice(&self.integrity.to_le_bytes());
        buf[6..10].copy_from_slice(&self.magic.to_le_bytes());
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Does not verify integrity; see [`crate::protocol::decode_frame`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(RadiowireError::ShortFrame {
                len: buf.len(),
                needed: HEADER_SIZE,
            });
        }
        Ok(Self {
            frame_type: FrameType::try_from(buf[0])?,
            state: buf[1],
            sequence: u16::from_le_bytes([buf[2], buf[3]]),
            integrity: u16::from_le_bytes([buf[4], buf[5]]),
            magic: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }

    /// Check if this is a broadcast frame.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.frame_type == FrameType::Broadcast
    }
}

/// Compute the integrity value of a complete frame.
///
/// The integrity field is treated as zero regardless of its content, so the
/// same function serves encoding and verification.
///
/// # Panics
///
/// Panics if `frame` is shorter than `HEADER_SIZE`.
pub fn compute_integrity(frame: &[u8]) -> u16 {
    let mut digest = INTEGRITY.digest();
    digest.update(&frame[..INTEGRITY_RANGE.start]);
    digest.update(&[0, 0]);
    digest.update(&frame[INTEGRITY_RANGE.end..]);
    digest.finalize()
}

/// Read the integrity value carried by a frame.
#[inline]
pub(crate) fn stored_integrity(frame: &[u8]) -> u16 {
    u16::from_le_bytes([frame[INTEGRITY_RANGE.start], frame[INTEGRITY_RANGE.start + 1]])
}

/// Write an integrity value into a frame.
#[inline]
pub(crate) fn store_integrity(frame: &mut [u8], integrity: u16) {
    frame[INTEGRITY_RANGE].copy_from_slice(&integrity.to_le_bytes());
}
