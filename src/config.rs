//! Node configuration.
//!
//! Every field has a default, so a JSON document only needs the values it
//! changes:
//!
//! ```
//! use radiowire::NodeConfig;
//!
//! let config = NodeConfig::from_json_str(r#"{ "channel": 6, "heartbeat_timeout_ms": 15000 }"#).unwrap();
//! assert_eq!(config.channel, 6);
//! assert_eq!(config.queue_depth, 6);
//! assert_eq!(config.predefined_peers.len(), 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::DEFAULT_QUEUE_DEPTH;
use crate::controller::DEFAULT_REPLY_TEXT;
use crate::error::{RadiowireError, Result};
use crate::heartbeat::HeartbeatTiming;
use crate::peers::{PeerAddress, DEFAULT_CAPACITY};
use crate::protocol::{HEADER_SIZE, MAX_FRAME_LEN};

/// Peers the controller knows before any traffic.
pub const PREDEFINED_PEERS: [PeerAddress; 5] = [
    PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]),
    PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]),
    PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x03]),
    PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x04]),
    PeerAddress::new([0x34, 0x85, 0x18, 0x03, 0x95, 0x08]),
];

/// Runtime configuration of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Depth of the event queue between driver callbacks and the controller.
    pub queue_depth: usize,
    /// How long a publisher waits for queue space before dropping the event.
    pub publish_timeout_ms: u64,
    /// Capacity of each peer list.
    pub registry_capacity: usize,
    /// Largest frame sent, header included.
    pub max_frame_len: usize,
    /// Radio channel for new transport peer entries.
    pub channel: u8,
    pub probe_interval_ms: u64,
    pub check_interval_ms: u64,
    /// Silence after a probe before a peer is reported unreachable.
    pub heartbeat_timeout_ms: u64,
    /// Probe from the start instead of waiting for the first heartbeat frame.
    pub heartbeat_initially_active: bool,
    /// Text carried by data replies.
    pub reply_text: String,
    /// Known peers at startup.
    pub predefined_peers: Vec<PeerAddress>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let timing = HeartbeatTiming::default();
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            publish_timeout_ms: 512,
            registry_capacity: DEFAULT_CAPACITY,
            max_frame_len: MAX_FRAME_LEN,
            channel: 1,
            probe_interval_ms: timing.probe_interval.as_millis() as u64,
            check_interval_ms: timing.check_interval.as_millis() as u64,
            heartbeat_timeout_ms: timing.timeout.as_millis() as u64,
            heartbeat_initially_active: false,
            reply_text: DEFAULT_REPLY_TEXT.to_string(),
            predefined_peers: PREDEFINED_PEERS.to_vec(),
        }
    }
}

impl NodeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: NodeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the values against the protocol limits.
    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(RadiowireError::Config("queue_depth must be at least 1".into()));
        }
        if self.registry_capacity == 0 {
            return Err(RadiowireError::Config(
                "registry_capacity must be at least 1".into(),
            ));
        }
        if !(HEADER_SIZE + 1..=MAX_FRAME_LEN).contains(&self.max_frame_len) {
            return Err(RadiowireError::Config(format!(
                "max_frame_len must be within {}..={}, got {}",
                HEADER_SIZE + 1,
                MAX_FRAME_LEN,
                self.max_frame_len
            )));
        }
        for (name, value) in [
            ("probe_interval_ms", self.probe_interval_ms),
            ("check_interval_ms", self.check_interval_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
        ] {
            if value == 0 {
                return Err(RadiowireError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.predefined_peers.iter().any(PeerAddress::is_broadcast) {
            return Err(RadiowireError::Config(
                "predefined_peers must not contain the broadcast address".into(),
            ));
        }
        Ok(())
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn heartbeat_timing(&self) -> HeartbeatTiming {
        HeartbeatTiming {
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            check_interval: Duration::from_millis(self.check_interval_ms),
            timeout: Duration::from_millis(self.heartbeat_timeout_ms),
        }
    }
}
