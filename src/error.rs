//! Error types for radiowire.

use thiserror::Error;

use crate::peers::{PeerAddress, PeerList};

/// Main error type for all radiowire operations.
#[derive(Debug, Error)]
pub enum RadiowireError {
    /// Received frame is shorter than the fixed header.
    #[error("Frame too short: {len} bytes, header needs {needed}")]
    ShortFrame { len: usize, needed: usize },

    /// Received frame is larger than the radio allows.
    #[error("Frame too long: {len} bytes, limit is {max}")]
    OversizedFrame { len: usize, max: usize },

    /// Recomputed CRC does not match the one carried by the frame.
    #[error("Integrity mismatch: frame carries {stored:#06x}, computed {computed:#06x}")]
    IntegrityMismatch { stored: u16, computed: u16 },

    /// Type byte is neither broadcast nor unicast.
    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    /// One of the peer lists is at capacity.
    #[error("Registry full: {list} list holds {capacity} peers")]
    RegistryFull { list: PeerList, capacity: usize },

    /// Event queue stayed full for the whole publish wait.
    #[error("Event queue full, event dropped")]
    QueueFull,

    /// The consumer side of the event bridge is gone.
    #[error("Event channel closed")]
    ChannelClosed,

    /// Transport refused to send a frame.
    #[error("Send to {address} rejected: {reason}")]
    SendRejected { address: PeerAddress, reason: String },

    /// Transport peer table cannot be modified yet.
    #[error("Transport not ready")]
    TransportNotReady,

    /// A buffer could not be allocated for an event or frame.
    #[error("Allocation of {size} bytes failed")]
    AllocationFailure { size: usize },

    /// A driver notification carried no usable data.
    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    /// Text could not be parsed as a hardware address.
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    /// A spawned task panicked or was cancelled.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Configuration rejected by validation.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error (configuration only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RadiowireError {
    /// Whether the error describes a received frame that must be dropped.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            RadiowireError::ShortFrame { .. }
                | RadiowireError::OversizedFrame { .. }
                | RadiowireError::IntegrityMismatch { .. }
                | RadiowireError::UnknownFrameType(_)
        )
    }
}

/// Result type alias using RadiowireError.
pub type Result<T> = std::result::Result<T, RadiowireError>;
