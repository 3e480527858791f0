//! Peer addressing and the bounded peer registry.

mod address;
mod registry;

pub use address::{PeerAddress, ADDRESS_LEN};
pub use registry::{
    InsertOutcome, KnownPeer, PeerList, PeerRegistry, SharedRegistry, DEFAULT_CAPACITY,
};
