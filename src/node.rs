//! Node builder and runtime.
//!
//! The [`NodeBuilder`] collects configuration; [`NodeBuilder::start`] wires
//! the components together and spawns the tasks:
//! 1. Validate the configuration
//! 2. Create the event bridge
//! 3. Seed the registry with the predefined peers
//! 4. Register the broadcast address with the transport
//! 5. Spawn the controller and the heartbeat tasks
//!
//! The driver side is connected afterwards by handing [`Node::notifier`] to
//! whatever delivers radio callbacks.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use radiowire::{MemoryTransport, Node};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> radiowire::Result<()> {
//! let transport = Arc::new(MemoryTransport::new());
//! let node = Node::builder()
//!     .channel(6)
//!     .heartbeat_timeout(Duration::from_secs(15))
//!     .start(transport.clone())?;
//! transport.attach(node.notifier());
//!
//! node.broadcast_discovery("hello")?;
//! assert_eq!(transport.sent().len(), 1);
//!
//! node.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bridge::{self, LinkNotifier};
use crate::config::NodeConfig;
use crate::controller::Controller;
use crate::error::{RadiowireError, Result};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatSignal, HeartbeatTasks};
use crate::peers::{PeerAddress, PeerRegistry, SharedRegistry};
use crate::protocol::{codes, SequenceCounters};
use crate::sender::FrameSender;
use crate::transport::Transport;

/// Builder for configuring and starting a [`Node`].
#[derive(Debug, Clone, Default)]
pub struct NodeBuilder {
    config: NodeConfig,
}

impl NodeBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the event queue depth (default: 6).
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.config.queue_depth = depth;
        self
    }

    /// Set how long publishers wait for queue space (default: 512 ms).
    pub fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.config.publish_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the capacity of each peer list (default: 10).
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.config.registry_capacity = capacity;
        self
    }

    /// Set the largest frame sent (default: 250).
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    /// Set the radio channel for new peer entries (default: 1).
    pub fn channel(mut self, channel: u8) -> Self {
        self.config.channel = channel;
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.config.check_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the silence after which a probed peer is unreachable (default: 20 s).
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.config.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Probe from the start instead of waiting for a heartbeat request.
    pub fn heartbeat_initially_active(mut self, active: bool) -> Self {
        self.config.heartbeat_initially_active = active;
        self
    }

    /// Set the text carried by data replies.
    pub fn reply_text(mut self, text: impl Into<String>) -> Self {
        self.config.reply_text = text.into();
        self
    }

    /// Replace the predefined peer list.
    pub fn predefined_peers(mut self, peers: impl IntoIterator<Item = PeerAddress>) -> Self {
        self.config.predefined_peers = peers.into_iter().collect();
        self
    }

    /// Start the node on `transport`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self, transport: Arc<dyn Transport>) -> Result<Node> {
        Node::start(self.config, transport)
    }
}

/// A running controller node.
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    notifier: LinkNotifier,
    registry: SharedRegistry,
    heartbeat_signal: HeartbeatSignal,
    sender: FrameSender,
    controller_task: JoinHandle<()>,
    heartbeat_tasks: HeartbeatTasks,
}

impl Node {
    /// Create a new node builder.
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    fn start(config: NodeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let (notifier, receiver) = bridge::channel(config.queue_depth, config.publish_timeout());

        let mut registry = PeerRegistry::new(config.registry_capacity);
        let seeded = registry.bootstrap(&config.predefined_peers);
        let registry = SharedRegistry::new(registry);

        let sender = FrameSender::new(
            transport,
            Arc::new(SequenceCounters::new()),
            config.max_frame_len,
            config.channel,
        );
        sender.ensure_peer(&PeerAddress::BROADCAST)?;

        let heartbeat_signal = HeartbeatSignal::new(config.heartbeat_initially_active);

        let controller = Controller::new(
            receiver,
            registry.clone(),
            sender.clone(),
            heartbeat_signal.clone(),
            config.reply_text.clone(),
        );
        let controller_task = tokio::spawn(controller.run());

        let heartbeat_tasks = HeartbeatMonitor::new(
            registry.clone(),
            sender.clone(),
            heartbeat_signal.clone(),
            config.heartbeat_timing(),
        )
        .spawn();

        tracing::info!(
            channel = config.channel,
            known_peers = seeded,
            heartbeat_active = config.heartbeat_initially_active,
            "Node started"
        );

        Ok(Self {
            config,
            notifier,
            registry,
            heartbeat_signal,
            sender,
            controller_task,
            heartbeat_tasks,
        })
    }

    /// Producer handle for driver callbacks.
    pub fn notifier(&self) -> LinkNotifier {
        self.notifier.clone()
    }

    /// The shared peer registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn heartbeat_signal(&self) -> &HeartbeatSignal {
        &self.heartbeat_signal
    }

    /// Send path shared with the controller.
    pub fn sender(&self) -> &FrameSender {
        &self.sender
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Broadcast a data frame so listening peers answer and get discovered.
    pub fn broadcast_discovery(&self, text: &str) -> Result<()> {
        tracing::debug!(text, "Broadcasting discovery");
        self.sender
            .send_text(&PeerAddress::BROADCAST, codes::STATE_DATA, 0, text)
    }

    /// Wait until every other notifier clone is dropped and the controller
    /// has drained the queue, then stop the heartbeat tasks.
    ///
    /// A transport given the notifier through `attach` holds only a weak
    /// handle and does not delay this. Fails with `TaskFailed` if the
    /// controller task panicked or was cancelled.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let Node {
            notifier,
            controller_task,
            heartbeat_tasks,
            ..
        } = self;
        drop(notifier);

        let result = controller_task.await;
        heartbeat_tasks.abort();
        if let Err(e) = result {
            tracing::error!(error = %e, "Controller task failed");
            return Err(RadiowireError::TaskFailed(e.to_string()));
        }
        Ok(())
    }

    /// Stop all tasks now. Queued events are discarded.
    pub async fn shutdown(self) {
        self.controller_task.abort();
        self.heartbeat_tasks.abort();
        let _ = self.controller_task.await;
        tracing::info!("Node stopped");
    }
}
