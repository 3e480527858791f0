//! Event bridge between radio-driver notifications and the controller.
//!
//! Driver callbacks must return quickly, so they only enqueue an [`Event`]
//! into a bounded FIFO. A single consumer drains it in order.
//!
//! ```text
//!  driver callbacks ──► LinkNotifier ──► [ bounded FIFO ] ──► EventReceiver ──► Controller
//!    (any thread)        (Clone)            depth 6             (single)
//! ```
//!
//! # Shedding
//!
//! When the queue stays full for the whole publish wait (512 ms by default)
//! the event is dropped together with its buffer and the publisher gets
//! [`RadiowireError::QueueFull`]. Nothing is retried.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError, TrySendError};

use crate::error::{RadiowireError, Result};
use crate::peers::PeerAddress;
use crate::protocol::MAX_FRAME_LEN;

/// Default queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 6;

/// Default time a publisher waits for queue space.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(512);

/// Poll interval of [`LinkNotifier::publish_blocking`].
const CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Delivery status reported by the driver for a sent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    Failure,
}

impl SendOutcome {
    #[inline]
    pub fn is_success(self) -> bool {
        self == SendOutcome::Success
    }
}

/// A driver notification waiting for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A previously accepted send finished.
    SendCompleted {
        address: PeerAddress,
        outcome: SendOutcome,
    },
    /// A frame arrived. `bytes` is owned by the event.
    FrameReceived {
        address: PeerAddress,
        bytes: Bytes,
        rssi: i8,
    },
}

impl Event {
    /// Peer the event concerns.
    pub fn address(&self) -> PeerAddress {
        match self {
            Event::SendCompleted { address, .. } | Event::FrameReceived { address, .. } => {
                *address
            }
        }
    }
}

/// Create a bridge with the given queue depth and publish timeout.
///
/// # Panics
///
/// Panics if `depth` is zero.
pub fn channel(depth: usize, publish_timeout: Duration) -> (LinkNotifier, EventReceiver) {
    let (tx, rx) = mpsc::channel(depth);
    (
        LinkNotifier {
            tx,
            timeout: publish_timeout,
        },
        EventReceiver { rx },
    )
}

/// Producer side of the bridge, handed to driver callbacks.
#[derive(Debug, Clone)]
pub struct LinkNotifier {
    tx: mpsc::Sender<Event>,
    timeout: Duration,
}

impl LinkNotifier {
    /// Enqueue an event, waiting at most the publish timeout for space.
    pub async fn publish(&self, event: Event) -> Result<()> {
        match self.tx.send_timeout(event, self.timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(event)) => Err(shed(event, self.timeout)),
            Err(SendTimeoutError::Closed(_)) => Err(RadiowireError::ChannelClosed),
        }
    }

    /// Blocking variant of [`publish`](Self::publish) for synchronous
    /// driver threads. Must not be called from inside an async task.
    pub fn publish_blocking(&self, event: Event) -> Result<()> {
        let start = std::time::Instant::now();
        let mut pending = event;

        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Closed(_)) => return Err(RadiowireError::ChannelClosed),
                Err(TrySendError::Full(event)) => {
                    if start.elapsed() >= self.timeout {
                        return Err(shed(event, self.timeout));
                    }
                    pending = event;
                }
            }
            std::thread::sleep(CHECK_INTERVAL);
        }
    }

    /// Enqueue without waiting.
    pub fn try_publish(&self, event: Event) -> Result<()> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(event) => shed(event, Duration::ZERO),
            TrySendError::Closed(_) => RadiowireError::ChannelClosed,
        })
    }

    /// Send-completion callback adapter.
    pub async fn on_send_complete(&self, address: PeerAddress, outcome: SendOutcome) -> Result<()> {
        self.publish(Event::SendCompleted { address, outcome }).await
    }

    /// Receive callback adapter.
    ///
    /// Copies the driver-owned buffer before publishing, since the driver
    /// reuses it once the callback returns.
    pub async fn on_receive(&self, address: PeerAddress, data: &[u8], rssi: i8) -> Result<()> {
        let event = received_event(address, data, rssi)?;
        tracing::trace!(peer = %address, rssi, len = data.len(), "Frame received");
        self.publish(event).await
    }

    /// Blocking variant of [`on_receive`](Self::on_receive).
    pub fn on_receive_blocking(&self, address: PeerAddress, data: &[u8], rssi: i8) -> Result<()> {
        let event = received_event(address, data, rssi)?;
        self.publish_blocking(event)
    }

    /// Configured publish timeout.
    #[inline]
    pub fn publish_timeout(&self) -> Duration {
        self.timeout
    }

    /// Check if the consumer is gone.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Handle that does not keep the bridge open.
    pub fn downgrade(&self) -> WeakLinkNotifier {
        WeakLinkNotifier {
            tx: self.tx.downgrade(),
            timeout: self.timeout,
        }
    }
}

/// Non-owning [`LinkNotifier`]; the bridge closes once only weak handles
/// remain.
#[derive(Debug, Clone)]
pub struct WeakLinkNotifier {
    tx: mpsc::WeakSender<Event>,
    timeout: Duration,
}

impl WeakLinkNotifier {
    /// Get a usable notifier while the bridge is still open.
    pub fn upgrade(&self) -> Option<LinkNotifier> {
        self.tx.upgrade().map(|tx| LinkNotifier {
            tx,
            timeout: self.timeout,
        })
    }
}

fn received_event(address: PeerAddress, data: &[u8], rssi: i8) -> Result<Event> {
    if data.is_empty() {
        return Err(RadiowireError::InvalidNotification(format!(
            "empty frame from {}",
            address
        )));
    }
    if data.len() > MAX_FRAME_LEN {
        return Err(RadiowireError::InvalidNotification(format!(
            "{}-byte frame from {} exceeds the {}-byte limit",
            data.len(),
            address,
            MAX_FRAME_LEN
        )));
    }

    let mut owned = Vec::new();
    owned
        .try_reserve_exact(data.len())
        .map_err(|_| RadiowireError::AllocationFailure { size: data.len() })?;
    owned.extend_from_slice(data);

    Ok(Event::FrameReceived {
        address,
        bytes: Bytes::from(owned),
        rssi,
    })
}

fn shed(event: Event, waited: Duration) -> RadiowireError {
    tracing::warn!(
        peer = %event.address(),
        waited_ms = waited.as_millis() as u64,
        "Event queue full, dropping event"
    );
    RadiowireError::QueueFull
}

/// Consumer side of the bridge. Not `Clone`: there is exactly one.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` once every [`LinkNotifier`] is dropped and the queue
    /// is drained.
    pub async fn consume(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_consume(&mut self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::new([0x24, 0x6F, 0x28, 0, 0, last])
    }

    fn completed(last: u8) -> Event {
        Event::SendCompleted {
            address: addr(last),
            outcome: SendOutcome::Success,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);

        for last in 1..=3 {
            notifier.publish(completed(last)).await.unwrap();
        }

        for last in 1..=3 {
            assert_eq!(receiver.consume().await.unwrap().address(), addr(last));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_times_out_when_full() {
        let (notifier, mut receiver) = channel(2, Duration::from_millis(512));
        notifier.publish(completed(1)).await.unwrap();
        notifier.publish(completed(2)).await.unwrap();

        let start = tokio::time::Instant::now();
        let result = notifier.publish(completed(3)).await;
        assert!(matches!(result, Err(RadiowireError::QueueFull)));
        assert!(start.elapsed() >= Duration::from_millis(512));

        // The shed event never shows up.
        assert_eq!(receiver.consume().await.unwrap().address(), addr(1));
        assert_eq!(receiver.consume().await.unwrap().address(), addr(2));
        assert!(receiver.try_consume().is_none());
    }

    #[tokio::test]
    async fn test_publish_waits_for_space() {
        let (notifier, mut receiver) = channel(1, Duration::from_secs(1));
        notifier.publish(completed(1)).await.unwrap();

        let consumer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let first = receiver.consume().await;
            let second = receiver.consume().await;
            (first, second)
        });

        notifier.publish(completed(2)).await.unwrap();
        let (first, second) = consumer.await.unwrap();
        assert_eq!(first.unwrap().address(), addr(1));
        assert_eq!(second.unwrap().address(), addr(2));
    }

    #[test]
    fn test_try_publish_full() {
        let (notifier, _receiver) = channel(1, DEFAULT_PUBLISH_TIMEOUT);
        notifier.try_publish(completed(1)).unwrap();
        assert!(matches!(
            notifier.try_publish(completed(2)),
            Err(RadiowireError::QueueFull)
        ));
    }

    #[test]
    fn test_publish_blocking_times_out() {
        let (notifier, _receiver) = channel(1, Duration::from_millis(20));
        notifier.publish_blocking(completed(1)).unwrap();

        let start = std::time::Instant::now();
        let result = notifier.publish_blocking(completed(2));
        assert!(matches!(result, Err(RadiowireError::QueueFull)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_publish_blocking_from_driver_thread() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);

        let driver = std::thread::spawn(move || {
            notifier
                .on_receive_blocking(addr(4), b"\x00\x00abc", -40)
                .unwrap();
        });
        driver.join().unwrap();

        match receiver.try_consume() {
            Some(Event::FrameReceived {
                address,
                bytes,
                rssi,
            }) => {
                assert_eq!(address, addr(4));
                assert_eq!(&bytes[..], b"\x00\x00abc");
                assert_eq!(rssi, -40);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_on_receive_rejects_empty() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);
        let result = notifier.on_receive(addr(1), &[], -50).await;
        assert!(matches!(result, Err(RadiowireError::InvalidNotification(_))));
        assert!(receiver.try_consume().is_none());
    }

    #[tokio::test]
    async fn test_on_receive_rejects_oversized() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);
        let result = notifier.on_receive(addr(1), &[0u8; 5011], -50).await;
        assert!(matches!(result, Err(RadiowireError::InvalidNotification(_))));
        assert!(receiver.try_consume().is_none());

        notifier
            .on_receive(addr(1), &[0u8; MAX_FRAME_LEN], -50)
            .await
            .unwrap();
        assert!(receiver.try_consume().is_some());
    }

    #[tokio::test]
    async fn test_on_receive_copies_buffer() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);
        let mut driver_buffer = vec![1u8, 2, 3];
        notifier.on_receive(addr(2), &driver_buffer, -60).await.unwrap();
        driver_buffer.fill(0);

        match receiver.consume().await {
            Some(Event::FrameReceived { bytes, .. }) => assert_eq!(&bytes[..], &[1, 2, 3]),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_on_send_complete() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);
        notifier
            .on_send_complete(addr(3), SendOutcome::Failure)
            .await
            .unwrap();
        assert_eq!(
            receiver.consume().await,
            Some(Event::SendCompleted {
                address: addr(3),
                outcome: SendOutcome::Failure
            })
        );
    }

    #[tokio::test]
    async fn test_consume_none_after_notifiers_dropped() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);
        let clone = notifier.clone();
        clone.publish(completed(1)).await.unwrap();
        drop(notifier);
        drop(clone);

        assert!(receiver.consume().await.is_some());
        assert!(receiver.consume().await.is_none());
    }

    #[tokio::test]
    async fn test_weak_notifier_does_not_hold_bridge_open() {
        let (notifier, mut receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);
        let weak = notifier.downgrade();

        weak.upgrade().unwrap().publish(completed(1)).await.unwrap();
        drop(notifier);

        assert!(receiver.consume().await.is_some());
        assert!(receiver.consume().await.is_none());
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped() {
        let (notifier, receiver) = channel(DEFAULT_QUEUE_DEPTH, DEFAULT_PUBLISH_TIMEOUT);
        drop(receiver);
        assert!(notifier.is_closed());
        assert!(matches!(
            notifier.publish(completed(1)).await,
            Err(RadiowireError::ChannelClosed)
        ));
    }
}
