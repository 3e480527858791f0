//! Protocol controller: the single consumer of bridge events.
//!
//! Each event is handled to completion before the next is taken, so the
//! controller's own registry updates never interleave with each other. The
//! heartbeat tasks still touch the registry concurrently, which is why every
//! access goes through [`SharedRegistry`].
//!
//! # Peer lifecycle
//!
//! ```text
//! (unseen) ──any frame but heartbeat──► unknown ──add-peer──► known ◄──probe/reply──► known, awaiting
//! ```
//!
//! Peers are never removed.
//!
//! # Dispatch
//!
//! | Command                | Reply                                         | Registry            |
//! |------------------------|-----------------------------------------------|---------------------|
//! | data, broadcast        | unicast data, echoed magic, reply text        | unknown if unseen   |
//! | data, pairing request  | unicast confirm-pairing, echoed magic         | unknown if unseen   |
//! | heartbeat              | none, activates probing                       | untouched           |
//! | add-peer               | none                                          | promoted to known   |
//! | confirm-pairing        | none, transport peer ensured                  | unknown if unseen   |
//! | request-data           | unicast data, echoed magic, reply text        | unknown if unseen   |
//! | unrecognized           | none                                          | unknown if unseen   |
//!
//! Any valid frame from a known peer counts as a reply for liveness.

use bytes::Bytes;
use tokio::time::Instant;

use crate::bridge::{Event, EventReceiver, SendOutcome};
use crate::error::Result;
use crate::heartbeat::HeartbeatSignal;
use crate::peers::{InsertOutcome, PeerAddress, SharedRegistry};
use crate::protocol::{codes, decode_frame, Command, DecodedFrame};
use crate::sender::FrameSender;

/// Default text carried by data replies.
pub const DEFAULT_REPLY_TEXT: &str = "hello_peer";

/// Consumes bridge events and drives the protocol.
#[derive(Debug)]
pub struct Controller {
    receiver: EventReceiver,
    registry: SharedRegistry,
    sender: FrameSender,
    heartbeat: HeartbeatSignal,
    reply_text: String,
}

impl Controller {
    pub fn new(
        receiver: EventReceiver,
        registry: SharedRegistry,
        sender: FrameSender,
        heartbeat: HeartbeatSignal,
        reply_text: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            registry,
            sender,
            heartbeat,
            reply_text: reply_text.into(),
        }
    }

    /// Handle events until every notifier is dropped.
    ///
    /// A failing event is logged and skipped.
    pub async fn run(mut self) {
        tracing::debug!("Controller started");
        while let Some(event) = self.receiver.consume().await {
            let address = event.address();
            if let Err(e) = self.handle_event(event) {
                tracing::warn!(peer = %address, error = %e, "Event handling failed");
            }
        }
        tracing::debug!("Event bridge closed, controller stopping");
    }

    /// Handle one event.
    ///
    /// Invalid frames are dropped and reported as `Ok`. Errors come from
    /// replies the transport refused or a registry that is full.
    pub fn handle_event(&self, event: Event) -> Result<()> {
        match event {
            Event::SendCompleted { address, outcome } => {
                match outcome {
                    SendOutcome::Success => tracing::debug!(peer = %address, "Send completed"),
                    SendOutcome::Failure => tracing::warn!(peer = %address, "Send failed"),
                }
                Ok(())
            }
            Event::FrameReceived {
                address,
                bytes,
                rssi,
            } => self.handle_frame(address, bytes, rssi),
        }
    }

    fn handle_frame(&self, address: PeerAddress, bytes: Bytes, rssi: i8) -> Result<()> {
        let frame = match decode_frame(&bytes) {
            Ok(frame) => frame,
            Err(e) if e.is_frame_error() => {
                tracing::warn!(peer = %address, rssi, len = bytes.len(), error = %e, "Dropping invalid frame");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let command = Command::of(&frame);
        tracing::debug!(
            peer = %address,
            rssi,
            frame_type = %frame.frame_type,
            seq = frame.sequence,
            state = frame.state,
            magic = frame.magic,
            command = command.name(),
            "Frame received"
        );

        if command != Command::HeartbeatProbe {
            self.note_if_unknown(address);
        }

        let result = match command {
            Command::Data { .. } if frame.is_broadcast() => {
                self.reply(&address, codes::STATE_DATA, &frame)
            }
            Command::Data { .. } if command.is_pairing_request() => {
                tracing::info!(peer = %address, "Pairing requested");
                self.reply(&address, codes::STATE_CONFIRM_PAIRING, &frame)
            }
            Command::Data { state } => {
                tracing::debug!(peer = %address, state, text = %frame.text(), "Data frame");
                Ok(())
            }
            Command::HeartbeatProbe => {
                if self.heartbeat.activate() {
                    tracing::info!(peer = %address, "Heartbeat requested, probing activated");
                }
                Ok(())
            }
            Command::RequestAddPeer => self.add_peer(address),
            Command::ConfirmPairing => self.sender.ensure_peer(&address).map(|_| {
                tracing::info!(peer = %address, "Pairing confirmed");
            }),
            Command::RequestData => self.reply(&address, codes::STATE_DATA, &frame),
            Command::Unrecognized { state, magic } => {
                tracing::debug!(peer = %address, state, magic, "Unrecognized command ignored");
                Ok(())
            }
        };

        self.registry.lock().mark_replied(&address, Instant::now());
        result
    }

    fn note_if_unknown(&self, address: PeerAddress) {
        let outcome = self.registry.lock().note_unknown(address);
        match outcome {
            Ok(InsertOutcome::Added) => tracing::info!(peer = %address, "New peer discovered"),
            Ok(InsertOutcome::AlreadyPresent) => {}
            Err(e) => tracing::warn!(peer = %address, error = %e, "Peer not tracked"),
        }
    }

    fn add_peer(&self, address: PeerAddress) -> Result<()> {
        let outcome = self.registry.lock().promote_to_known(address)?;
        match outcome {
            InsertOutcome::Added => tracing::info!(peer = %address, "Peer added to known list"),
            InsertOutcome::AlreadyPresent => {
                tracing::debug!(peer = %address, "Peer already known")
            }
        }
        Ok(())
    }

    /// Unicast `state` back to `address`, echoing the request's magic.
    fn reply(&self, address: &PeerAddress, state: u8, request: &DecodedFrame) -> Result<()> {
        self.sender.ensure_peer(address)?;
        self.sender
            .send_text(address, state, request.magic, &self.reply_text)
    }
}
