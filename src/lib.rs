//! # radiowire
//!
//! Controller-side coordination of a small group of short-range radio
//! peers over a connectionless broadcast/unicast link (ESP-NOW style).
//!
//! The controller discovers peers from their broadcasts, confirms pairing,
//! records peers that ask to be added, and probes known peers periodically
//! to report the ones that went silent.
//!
//! ## Architecture
//!
//! ```text
//! driver callbacks ─► LinkNotifier ─► [queue] ─► Controller ─► FrameSender ─► Transport
//!                                                    │              ▲
//!                                              SharedRegistry ◄─ HeartbeatMonitor
//! ```
//!
//! - **Frames** ([`protocol`]): 10-byte little-endian header with a CRC-16
//!   over the whole frame, then the payload.
//! - **Bridge** ([`bridge`]): bounded FIFO turning driver notifications into
//!   events; publishers wait a bounded time, then drop.
//! - **Registry** ([`peers`]): bounded known/unknown lists behind one mutex.
//! - **Controller** ([`controller`]): single consumer interpreting
//!   `(state, magic)` commands.
//! - **Heartbeat** ([`heartbeat`]): prober and timeout checker tasks.
//!
//! The radio itself sits behind the [`Transport`] trait;
//! [`MemoryTransport`] keeps everything in process.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use radiowire::{MemoryTransport, Node};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> radiowire::Result<()> {
//! let transport = Arc::new(MemoryTransport::new());
//! let node = Node::builder().reply_text("hello_peer").start(transport.clone())?;
//! transport.attach(node.notifier());
//!
//! // Frames from the radio are pushed with `node.notifier().on_receive(...)`.
//! node.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod heartbeat;
pub mod peers;
pub mod protocol;
pub mod sender;
pub mod transport;

mod node;

pub use bridge::{Event, EventReceiver, LinkNotifier, SendOutcome};
pub use config::NodeConfig;
pub use controller::Controller;
pub use error::{RadiowireError, Result};
pub use heartbeat::{HeartbeatMonitor, HeartbeatSignal, ProbeReport};
pub use node::{Node, NodeBuilder};
pub use peers::{PeerAddress, PeerRegistry, SharedRegistry};
pub use sender::FrameSender;
pub use transport::{MemoryTransport, PeerInfo, Transport};
