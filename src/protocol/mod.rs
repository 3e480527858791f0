//! Protocol module - wire format, frame codec, and command classification.
//!
//! This module implements the binary frame exchanged with peers:
//! - 10-byte little-endian header with a CRC-16 integrity field
//! - Frame encoding with per-type sequence counters
//! - Decoding with length and integrity verification
//! - `(state, magic)` classification into [`Command`]

mod command;
mod frame;
mod wire_format;

pub use command::Command;
pub use frame::{
    decode_frame, encode_frame, encode_text_frame, frame_type_for, DecodedFrame,
    SequenceCounters,
};
pub use wire_format::{
    codes, compute_integrity, FrameType, Header, HEADER_SIZE, INTEGRITY_RANGE, MAX_FRAME_LEN,
    MAX_PAYLOAD_LEN,
};
