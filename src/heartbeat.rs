//! Heartbeat liveness monitor.
//!
//! Two periodic tasks share the registry with the controller:
//!
//! | Task    | Period           | Work                                                    |
//! |---------|------------------|---------------------------------------------------------|
//! | prober  | `probe_interval` | probe every known peer, mark it as awaiting a reply      |
//! | checker | `check_interval` | warn about peers silent longer than `timeout`, reset them |
//!
//! The prober stays dormant until [`HeartbeatSignal::activate`] is called,
//! which the controller does when a peer first sends a heartbeat frame.
//! Unreachable peers are only reported; they stay in the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Result;
use crate::peers::{PeerAddress, SharedRegistry};
use crate::protocol::codes;
use crate::sender::FrameSender;

/// Default interval between probe rounds.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Default interval between timeout checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default silence after which a probed peer is reported unreachable.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Activation flag for the prober.
#[derive(Debug, Clone)]
pub struct HeartbeatSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl HeartbeatSignal {
    pub fn new(active: bool) -> Self {
        let (tx, _) = watch::channel(active);
        Self { tx: Arc::new(tx) }
    }

    /// Activate probing. Returns `true` if this call changed the state.
    pub fn activate(&self) -> bool {
        self.tx.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        })
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until probing is active.
    pub async fn wait_active(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|active| *active).await;
    }
}

impl Default for HeartbeatSignal {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Result of one probe round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Probes handed to the transport.
    pub sent: usize,
    /// Peers skipped because registration or sending failed.
    pub failed: usize,
}

/// Timing of the heartbeat tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTiming {
    pub probe_interval: Duration,
    pub check_interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatTiming {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Prober and checker over a shared registry.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    registry: SharedRegistry,
    sender: FrameSender,
    signal: HeartbeatSignal,
    timing: HeartbeatTiming,
}

impl HeartbeatMonitor {
    pub fn new(
        registry: SharedRegistry,
        sender: FrameSender,
        signal: HeartbeatSignal,
        timing: HeartbeatTiming,
    ) -> Self {
        Self {
            registry,
            sender,
            signal,
            timing,
        }
    }

    /// Probe every known peer once.
    ///
    /// The peer list is copied under the lock and the lock is released
    /// before any transport call. A peer is marked as probed before the
    /// frame leaves, so a reply can never be overwritten by the mark; a
    /// failed send restores the previous state. A failure for one peer
    /// does not stop the round.
    pub fn probe_once(&self, now: Instant) -> ProbeReport {
        let peers = self.registry.known_addresses();
        let mut report = ProbeReport::default();

        for address in peers {
            let previous = {
                let mut registry = self.registry.lock();
                let previous = registry.peer(&address).copied();
                registry.mark_probe_sent(&address, now);
                previous
            };
            let Some(previous) = previous else {
                continue;
            };

            match self.probe(&address) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    self.registry.lock().revert_probe(&previous);
                    tracing::warn!(peer = %address, error = %e, "Heartbeat probe failed");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(sent = report.sent, failed = report.failed, "Heartbeat round done");
        report
    }

    fn probe(&self, address: &PeerAddress) -> Result<()> {
        self.sender.ensure_peer(address)?;
        self.sender
            .send_bytes(address, codes::STATE_HEARTBEAT, codes::MAGIC_HEARTBEAT, &[])
    }

    /// Report peers that stayed silent past the timeout.
    ///
    /// Each reported peer stops awaiting a reply, so it is reported once
    /// per unanswered probe.
    pub fn check_once(&self, now: Instant) -> Vec<PeerAddress> {
        let overdue: Vec<PeerAddress> = {
            let mut registry = self.registry.lock();
            let overdue: Vec<_> = registry
                .peers_exceeding_timeout(now, self.timing.timeout)
                .collect();
            for address in &overdue {
                registry.clear_awaiting(address);
            }
            overdue
        };

        for address in &overdue {
            tracing::warn!(
                peer = %address,
                timeout_ms = self.timing.timeout.as_millis() as u64,
                "Peer unreachable"
            );
        }
        overdue
    }

    /// Spawn the prober and checker tasks.
    pub fn spawn(self) -> HeartbeatTasks {
        let monitor = Arc::new(self);

        let prober = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                monitor.signal.wait_active().await;
                tracing::info!("Heartbeat probing active");

                let mut interval = tokio::time::interval(monitor.timing.probe_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    monitor.probe_once(Instant::now());
                }
            })
        };

        let checker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.timing.check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                monitor.check_once(Instant::now());
            }
        });

        HeartbeatTasks { prober, checker }
    }
}

/// Handles of the spawned heartbeat tasks.
#[derive(Debug)]
pub struct HeartbeatTasks {
    pub prober: JoinHandle<()>,
    pub checker: JoinHandle<()>,
}

impl HeartbeatTasks {
    /// Stop both tasks.
    pub fn abort(&self) {
        self.prober.abort();
        self.checker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::PeerRegistry;
    use crate::protocol::{decode_frame, Command, SequenceCounters, MAX_FRAME_LEN};
    use crate::transport::{MemoryTransport, Transport};

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::new([0x24, 0x6F, 0x28, 0, 0, last])
    }

    fn setup(peers: &[PeerAddress]) -> (Arc<MemoryTransport>, SharedRegistry, HeartbeatMonitor) {
        let transport = Arc::new(MemoryTransport::new());
        let mut registry = PeerRegistry::new(10);
        registry.bootstrap(peers);
        let registry = SharedRegistry::new(registry);
        let sender = FrameSender::new(
            transport.clone(),
            Arc::new(SequenceCounters::new()),
            MAX_FRAME_LEN,
            1,
        );
        let monitor = HeartbeatMonitor::new(
            registry.clone(),
            sender,
            HeartbeatSignal::new(false),
            HeartbeatTiming::default(),
        );
        (transport, registry, monitor)
    }

    #[test]
    fn test_signal_activation() {
        let signal = HeartbeatSignal::default();
        let clone = signal.clone();
        assert!(!signal.is_active());
        assert!(clone.activate());
        assert!(!clone.activate());
        assert!(signal.is_active());
    }

    #[tokio::test]
    async fn test_wait_active_wakes() {
        let signal = HeartbeatSignal::new(false);
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_active().await })
        };
        tokio::task::yield_now().await;
        signal.activate();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_once_sends_and_marks() {
        let (transport, registry, monitor) = setup(&[addr(1), addr(2)]);
        let now = Instant::now();

        let report = monitor.probe_once(now);
        assert_eq!(report, ProbeReport { sent: 2, failed: 0 });

        for last in [1, 2] {
            assert!(transport.has_peer(&addr(last)));
            let sent = transport.sent_to(&addr(last));
            assert_eq!(sent.len(), 1);
            let frame = decode_frame(&sent[0]).unwrap();
            assert_eq!(Command::of(&frame), Command::HeartbeatProbe);

            let peer = *registry.lock().peer(&addr(last)).unwrap();
            assert!(peer.awaiting_reply);
            assert_eq!(peer.last_contact, Some(now));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_does_not_stop_round() {
        let (transport, registry, monitor) = setup(&[addr(1), addr(2)]);
        transport.set_reject_sends(true);

        let report = monitor.probe_once(Instant::now());
        assert_eq!(report, ProbeReport { sent: 0, failed: 2 });
        assert!(!registry.lock().peer(&addr(1)).unwrap().awaiting_reply);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_once_reports_silent_peer_once() {
        let (_transport, registry, monitor) = setup(&[addr(1), addr(2)]);
        let t0 = Instant::now();
        monitor.probe_once(t0);
        registry
            .lock()
            .mark_replied(&addr(2), t0 + Duration::from_secs(1));

        assert!(monitor.check_once(t0 + Duration::from_secs(20)).is_empty());

        let overdue = monitor.check_once(t0 + Duration::from_secs(21));
        assert_eq!(overdue, vec![addr(1)]);
        assert!(monitor.check_once(t0 + Duration::from_secs(22)).is_empty());

        // Reported, not removed.
        assert!(registry.is_known(&addr(1)));
    }

    /// Transport whose peers answer before `send` returns.
    struct InstantReply {
        inner: MemoryTransport,
        registry: SharedRegistry,
    }

    impl Transport for InstantReply {
        fn send(&self, dest: &PeerAddress, frame: bytes::Bytes) -> Result<()> {
            self.inner.send(dest, frame)?;
            self.registry.lock().mark_replied(dest, Instant::now());
            Ok(())
        }

        fn has_peer(&self, address: &PeerAddress) -> bool {
            self.inner.has_peer(address)
        }

        fn register_peer(
            &self,
            peer: crate::transport::PeerInfo,
        ) -> Result<crate::transport::RegisterOutcome> {
            self.inner.register_peer(peer)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_during_send_is_kept() {
        let mut registry = PeerRegistry::new(10);
        registry.bootstrap(&[addr(1)]);
        let registry = SharedRegistry::new(registry);
        let transport = Arc::new(InstantReply {
            inner: MemoryTransport::new(),
            registry: registry.clone(),
        });
        let sender = FrameSender::new(transport, Arc::new(SequenceCounters::new()), MAX_FRAME_LEN, 1);
        let monitor = HeartbeatMonitor::new(
            registry.clone(),
            sender,
            HeartbeatSignal::new(true),
            HeartbeatTiming::default(),
        );

        let t0 = Instant::now();
        assert_eq!(monitor.probe_once(t0).sent, 1);
        assert!(!registry.lock().peer(&addr(1)).unwrap().awaiting_reply);
        assert!(monitor.check_once(t0 + Duration::from_secs(21)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_restores_outstanding_heartbeat() {
        let (transport, registry, monitor) = setup(&[addr(1)]);
        let t0 = Instant::now();
        monitor.probe_once(t0);

        transport.set_reject_sends(true);
        monitor.probe_once(t0 + Duration::from_secs(10));

        let peer = *registry.lock().peer(&addr(1)).unwrap();
        assert!(peer.awaiting_reply);
        assert_eq!(peer.last_contact, Some(t0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_probes_do_not_hide_silence() {
        let (_transport, _registry, monitor) = setup(&[addr(1)]);
        let t0 = Instant::now();
        monitor.probe_once(t0);
        monitor.probe_once(t0 + Duration::from_secs(10));
        monitor.probe_once(t0 + Duration::from_secs(20));

        assert_eq!(
            monitor.check_once(t0 + Duration::from_secs(21)),
            vec![addr(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_prober_waits_for_activation() {
        let (transport, _registry, monitor) = setup(&[addr(1)]);
        let signal = monitor.signal.clone();
        let tasks = monitor.spawn();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(transport.sent().is_empty());

        signal.activate();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.sent_to(&addr(1)).len(), 1);

        tokio::time::sleep(DEFAULT_PROBE_INTERVAL).await;
        assert_eq!(transport.sent_to(&addr(1)).len(), 2);

        tasks.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_checker_clears_overdue_peers() {
        let (_transport, registry, monitor) = setup(&[addr(1)]);
        monitor.probe_once(Instant::now());
        let tasks = monitor.spawn();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!registry.lock().peer(&addr(1)).unwrap().awaiting_reply);

        tasks.abort();
    }
}
