//! Hardware addresses of radio peers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RadiowireError;

/// Length of a hardware address in bytes.
pub const ADDRESS_LEN: usize = 6;

/// 6-byte hardware address of a peer.
///
/// Displayed and parsed as colon-separated hex (`24:6f:28:00:00:01`).
///
/// # Example
///
/// ```
/// use radiowire::peers::PeerAddress;
///
/// let addr: PeerAddress = "24:6F:28:00:00:01".parse().unwrap();
/// assert_eq!(addr.octets(), [0x24, 0x6f, 0x28, 0, 0, 1]);
/// assert_eq!(addr.to_string(), "24:6f:28:00:00:01");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerAddress([u8; ADDRESS_LEN]);

impl PeerAddress {
    /// The broadcast address, `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: PeerAddress = PeerAddress([0xFF; ADDRESS_LEN]);

    /// Create an address from its octets.
    #[inline]
    pub const fn new(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }

    /// Build an address from a driver-supplied slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RadiowireError> {
        let octets: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            RadiowireError::InvalidAddress(format!("expected 6 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(octets))
    }

    /// Get the raw octets.
    #[inline]
    pub const fn octets(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }

    /// Check if this is the broadcast address.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Check if every octet is zero (an empty configuration slot).
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; ADDRESS_LEN]
    }
}

impl From<[u8; ADDRESS_LEN]> for PeerAddress {
    fn from(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddress({})", self)
    }
}

impl FromStr for PeerAddress {
    type Err = RadiowireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; ADDRESS_LEN];
        let mut parts = s.split([':', '-']);

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| RadiowireError::InvalidAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(RadiowireError::InvalidAddress(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| RadiowireError::InvalidAddress(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(RadiowireError::InvalidAddress(s.to_string()));
        }
        Ok(Self(octets))
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
