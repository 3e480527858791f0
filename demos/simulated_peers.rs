//! Simulated peers - a controller node talking to two fake radios.
//!
//! This demo shows:
//! - Starting a node over the in-memory transport
//! - Discovery, add-peer and heartbeat requests coming from peers
//! - One peer echoing heartbeat probes, the other going silent
//!
//! # Running
//!
//! ```text
//! RUST_LOG=radiowire=debug cargo run --example simulated_peers
//! ```

use std::sync::Arc;
use std::time::Duration;

use radiowire::protocol::{decode_frame, encode_text_frame, Command, FrameType, SequenceCounters};
use radiowire::{MemoryTransport, Node, PeerAddress};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// A fake radio on the other end of the link.
struct SimPeer {
    address: PeerAddress,
    counters: SequenceCounters,
}

impl SimPeer {
    fn new(octets: [u8; 6]) -> Self {
        Self {
            address: PeerAddress::new(octets),
            counters: SequenceCounters::new(),
        }
    }

    async fn send(
        &self,
        transport: &MemoryTransport,
        frame_type: FrameType,
        state: u8,
        magic: u32,
        text: &str,
    ) -> radiowire::Result<()> {
        let frame = encode_text_frame(frame_type, state, magic, text, &self.counters, 250)?;
        transport.inject(self.address, &frame, -48).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    fmt().with_env_filter(filter).with_target(true).init();

    let transport = Arc::new(MemoryTransport::new());
    let node = Node::builder()
        .predefined_peers([])
        .reply_text("hello_master")
        .probe_interval(Duration::from_secs(2))
        .check_interval(Duration::from_secs(1))
        .heartbeat_timeout(Duration::from_secs(3))
        .start(transport.clone())?;
    transport.attach(node.notifier());

    let lively = SimPeer::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
    let silent = SimPeer::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]);

    node.broadcast_discovery("controller here")?;

    for peer in [&lively, &silent] {
        peer.send(&transport, FrameType::Broadcast, 0, 7, "hello").await?;
        peer.send(&transport, FrameType::Unicast, 1, 8, "pair me").await?;
        peer.send(&transport, FrameType::Unicast, 8, 888_888, "").await?;
    }
    lively.send(&transport, FrameType::Unicast, 9, 999_999, "").await?;

    // Answer probes addressed to the lively peer for a while.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(8);
    while tokio::time::Instant::now() < deadline {
        for sent in transport.take_sent() {
            let Ok(frame) = decode_frame(&sent.bytes) else {
                continue;
            };
            let command = Command::of(&frame);
            info!(to = %sent.dest, command = command.name(), text = %frame.text(), "Radio sent");

            if sent.dest == lively.address && command == Command::HeartbeatProbe {
                lively
                    .send(&transport, FrameType::Unicast, 9, 999_999, "")
                    .await?;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    for peer in node.registry().lock().known_peers() {
        info!(
            peer = %peer.address,
            awaiting_reply = peer.awaiting_reply,
            "Known peer"
        );
    }

    node.shutdown().await;
    Ok(())
}
