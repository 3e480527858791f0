//! Command classification.
//!
//! Peers encode their intent in the `(state, magic)` header pair. The pair is
//! decoded once, here, into a closed [`Command`] set so the controller never
//! re-tests raw integers.

use super::frame::DecodedFrame;
use super::wire_format::codes;

/// What a received frame asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Plain data; the state distinguishes ordinary data from a pairing request.
    Data { state: u8 },
    /// Heartbeat probe or its echo.
    HeartbeatProbe,
    /// Request to be recorded as a known peer.
    RequestAddPeer,
    /// Pairing confirmation.
    ConfirmPairing,
    /// Request for a data frame.
    RequestData,
    /// Anything else.
    Unrecognized { state: u8, magic: u32 },
}

impl Command {
    /// Classify a `(state, magic)` pair.
    ///
    /// The magic tag only matters for the heartbeat and add-peer states; a
    /// wrong tag on those states yields `Unrecognized`.
    pub fn classify(state: u8, magic: u32) -> Self {
        match (state, magic) {
            (codes::STATE_HEARTBEAT, codes::MAGIC_HEARTBEAT) => Command::HeartbeatProbe,
            (codes::STATE_ADD_PEER, codes::MAGIC_ADD_PEER) => Command::RequestAddPeer,
            (codes::STATE_CONFIRM_PAIRING, _) => Command::ConfirmPairing,
            (codes::STATE_REQUEST_DATA, _) => Command::RequestData,
            (codes::STATE_DATA | codes::STATE_PAIRING_REQUEST, _) => Command::Data { state },
            _ => Command::Unrecognized { state, magic },
        }
    }

    /// Classify a decoded frame.
    #[inline]
    pub fn of(frame: &DecodedFrame) -> Self {
        Self::classify(frame.state, frame.magic)
    }

    /// Check if this data command asks for pairing.
    #[inline]
    pub fn is_pairing_request(&self) -> bool {
        matches!(self, Command::Data { state } if *state == codes::STATE_PAIRING_REQUEST)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Data { .. } => "data",
            Command::HeartbeatProbe => "heartbeat",
            Command::RequestAddPeer => "add-peer",
            Command::ConfirmPairing => "confirm-pairing",
            Command::RequestData => "request-data",
            Command::Unrecognized { .. } => "unrecognized",
        }
    }
}
