//! Bounded registry of known and unknown peers.
//!
//! Two fixed-capacity lists, disjoint by construction:
//!
//! | List      | Filled by                                 | Tracks                         |
//! |-----------|-------------------------------------------|--------------------------------|
//! | `known`   | predefined peers, add-peer requests       | awaiting reply, last contact   |
//! | `unknown` | frames from addresses not yet known       | address only                   |
//!
//! Insertion is idempotent and never evicts: a full list rejects the new
//! address with [`RadiowireError::RegistryFull`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::time::Instant;

use super::address::PeerAddress;
use crate::error::{RadiowireError, Result};

/// Default capacity of each list.
pub const DEFAULT_CAPACITY: usize = 10;

/// Which of the two lists an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerList {
    Known,
    Unknown,
}

impl fmt::Display for PeerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerList::Known => f.write_str("known"),
            PeerList::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of an idempotent insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The address was added.
    Added,
    /// The address was already recorded; nothing changed.
    AlreadyPresent,
}

/// A confirmed peer and its liveness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPeer {
    pub address: PeerAddress,
    /// A probe was sent and no reply has arrived since.
    pub awaiting_reply: bool,
    /// Time of the last probe or reply, unset until the first one.
    pub last_contact: Option<Instant>,
}

impl KnownPeer {
    fn new(address: PeerAddress) -> Self {
        Self {
            address,
            awaiting_reply: false,
            last_contact: None,
        }
    }

    /// Whether this peer is overdue at `now`.
    pub fn exceeds_timeout(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_contact {
            Some(last) if self.awaiting_reply => now.saturating_duration_since(last) > timeout,
            _ => false,
        }
    }
}

/// Known and unknown peer lists.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    known: Vec<KnownPeer>,
    unknown: Vec<PeerAddress>,
    capacity: usize,
}

impl PeerRegistry {
    /// Create an empty registry holding at most `capacity` peers per list.
    pub fn new(capacity: usize) -> Self {
        Self {
            known: Vec::with_capacity(capacity),
            unknown: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Seed the known list from a predefined set.
    ///
    /// Duplicates and all-zero addresses are skipped; entries beyond the
    /// capacity are ignored. Returns the number of peers added.
    pub fn bootstrap<'a, I>(&mut self, predefined: I) -> usize
    where
        I: IntoIterator<Item = &'a PeerAddress>,
    {
        let mut added = 0;
        for address in predefined {
            if address.is_zero() {
                continue;
            }
            match self.promote_to_known(*address) {
                Ok(InsertOutcome::Added) => added += 1,
                Ok(InsertOutcome::AlreadyPresent) => {}
                Err(_) => {
                    tracing::warn!(
                        capacity = self.capacity,
                        peer = %address,
                        "Predefined peer list exceeds registry capacity, remainder ignored"
                    );
                    break;
                }
            }
        }
        added
    }

    /// Record an address seen in traffic but not yet known.
    ///
    /// Already-known addresses report `AlreadyPresent` and stay out of the
    /// unknown list.
    pub fn note_unknown(&mut self, address: PeerAddress) -> Result<InsertOutcome> {
        if self.is_known(&address) || self.is_unknown(&address) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        if self.unknown.len() >= self.capacity {
            return Err(RadiowireError::RegistryFull {
                list: PeerList::Unknown,
                capacity: self.capacity,
            });
        }
        self.unknown.push(address);
        Ok(InsertOutcome::Added)
    }

    /// Record an address as known, removing it from the unknown list.
    pub fn promote_to_known(&mut self, address: PeerAddress) -> Result<InsertOutcome> {
        if self.is_known(&address) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        if self.known.len() >= self.capacity {
            return Err(RadiowireError::RegistryFull {
                list: PeerList::Known,
                capacity: self.capacity,
            });
        }
        self.unknown.retain(|a| *a != address);
        self.known.push(KnownPeer::new(address));
        Ok(InsertOutcome::Added)
    }

    /// Note that a probe went out to `address`.
    ///
    /// While an earlier probe is still unanswered its time is kept, so
    /// repeated probes cannot push the timeout out indefinitely.
    pub fn mark_probe_sent(&mut self, address: &PeerAddress, now: Instant) -> bool {
        self.update(address, |peer| {
            if !peer.awaiting_reply || peer.last_contact.is_none() {
                peer.last_contact = Some(now);
            }
            peer.awaiting_reply = true;
        })
    }

    /// Undo [`mark_probe_sent`](Self::mark_probe_sent) for a probe that never
    /// left, restoring the liveness state captured before it.
    ///
    /// A reply recorded in the meantime is kept.
    pub fn revert_probe(&mut self, previous: &KnownPeer) -> bool {
        self.update(&previous.address, |peer| {
            if peer.awaiting_reply {
                peer.awaiting_reply = previous.awaiting_reply;
                peer.last_contact = previous.last_contact;
            }
        })
    }

    /// Note that `address` answered.
    pub fn mark_replied(&mut self, address: &PeerAddress, now: Instant) -> bool {
        self.update(address, |peer| {
            peer.awaiting_reply = false;
            peer.last_contact = Some(now);
        })
    }

    /// Stop waiting for a reply from `address` without touching its contact time.
    pub fn clear_awaiting(&mut self, address: &PeerAddress) -> bool {
        self.update(address, |peer| peer.awaiting_reply = false)
    }

    /// Known peers that were probed and stayed silent longer than `timeout`.
    pub fn peers_exceeding_timeout(
        &self,
        now: Instant,
        timeout: Duration,
    ) -> impl Iterator<Item = PeerAddress> + '_ {
        self.known
            .iter()
            .filter(move |peer| peer.exceeds_timeout(now, timeout))
            .map(|peer| peer.address)
    }

    pub fn is_known(&self, address: &PeerAddress) -> bool {
        self.known.iter().any(|peer| peer.address == *address)
    }

    pub fn is_unknown(&self, address: &PeerAddress) -> bool {
        self.unknown.contains(address)
    }

    /// Entry for a known peer.
    pub fn peer(&self, address: &PeerAddress) -> Option<&KnownPeer> {
        self.known.iter().find(|peer| peer.address == *address)
    }

    pub fn known_peers(&self) -> impl Iterator<Item = &KnownPeer> + '_ {
        self.known.iter()
    }

    pub fn unknown_peers(&self) -> impl Iterator<Item = &PeerAddress> + '_ {
        self.unknown.iter()
    }

    /// Addresses of all known peers, in insertion order.
    pub fn known_addresses(&self) -> Vec<PeerAddress> {
        self.known.iter().map(|peer| peer.address).collect()
    }

    #[inline]
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    #[inline]
    pub fn unknown_count(&self) -> usize {
        self.unknown.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn update(&mut self, address: &PeerAddress, f: impl FnOnce(&mut KnownPeer)) -> bool {
        match self.known.iter_mut().find(|peer| peer.address == *address) {
            Some(peer) => {
                f(peer);
                true
            }
            None => false,
        }
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Registry shared between the controller and the heartbeat tasks.
///
/// Guards are synchronous; never hold one across an `.await` or a transport
/// call.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<PeerRegistry>>);

impl SharedRegistry {
    pub fn new(registry: PeerRegistry) -> Self {
        Self(Arc::new(Mutex::new(registry)))
    }

    /// Lock the registry.
    pub fn lock(&self) -> MutexGuard<'_, PeerRegistry> {
        self.0.lock()
    }

    /// Copy of the known addresses, taken under the lock.
    pub fn known_addresses(&self) -> Vec<PeerAddress> {
        self.lock().known_addresses()
    }

    pub fn is_known(&self, address: &PeerAddress) -> bool {
        self.lock().is_known(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::new([0x24, 0x6F, 0x28, 0, 0, last])
    }

    #[test]
    fn test_insertion_is_idempotent() {
        let mut registry = PeerRegistry::new(4);
        assert_eq!(registry.note_unknown(addr(1)).unwrap(), InsertOutcome::Added);
        assert_eq!(
            registry.note_unknown(addr(1)).unwrap(),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(registry.unknown_count(), 1);

        assert_eq!(
            registry.promote_to_known(addr(2)).unwrap(),
            InsertOutcome::Added
        );
        assert_eq!(
            registry.promote_to_known(addr(2)).unwrap(),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(registry.known_count(), 1);
    }

    #[test]
    fn test_capacity_rejects_without_eviction() {
        let mut registry = PeerRegistry::new(2);
        registry.note_unknown(addr(1)).unwrap();
        registry.note_unknown(addr(2)).unwrap();

        let err = registry.note_unknown(addr(3)).unwrap_err();
        assert!(matches!(
            err,
            RadiowireError::RegistryFull {
                list: PeerList::Unknown,
                capacity: 2
            }
        ));
        assert!(registry.is_unknown(&addr(1)));
        assert!(registry.is_unknown(&addr(2)));
        assert!(!registry.is_unknown(&addr(3)));
    }

    #[test]
    fn test_known_full() {
        let mut registry = PeerRegistry::new(1);
        registry.promote_to_known(addr(1)).unwrap();
        assert!(matches!(
            registry.promote_to_known(addr(2)),
            Err(RadiowireError::RegistryFull {
                list: PeerList::Known,
                ..
            })
        ));
    }

    #[test]
    fn test_known_address_not_noted_unknown() {
        let mut registry = PeerRegistry::new(4);
        registry.promote_to_known(addr(1)).unwrap();
        assert_eq!(
            registry.note_unknown(addr(1)).unwrap(),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(registry.unknown_count(), 0);
    }

    #[test]
    fn test_promotion_keeps_lists_disjoint() {
        let mut registry = PeerRegistry::new(4);
        registry.note_unknown(addr(1)).unwrap();
        registry.note_unknown(addr(2)).unwrap();

        registry.promote_to_known(addr(1)).unwrap();
        assert!(registry.is_known(&addr(1)));
        assert!(!registry.is_unknown(&addr(1)));
        assert_eq!(
            registry.unknown_peers().copied().collect::<Vec<_>>(),
            vec![addr(2)]
        );
    }

    #[test]
    fn test_bootstrap_skips_zero_and_duplicates() {
        let mut registry = PeerRegistry::new(10);
        let predefined = [addr(1), PeerAddress::default(), addr(2), addr(1)];
        assert_eq!(registry.bootstrap(&predefined), 2);
        assert_eq!(registry.known_addresses(), vec![addr(1), addr(2)]);
    }

    #[test]
    fn test_bootstrap_caps_at_capacity() {
        let mut registry = PeerRegistry::new(2);
        let predefined = [addr(1), addr(2), addr(3)];
        assert_eq!(registry.bootstrap(&predefined), 2);
        assert!(!registry.is_known(&addr(3)));
    }

    #[test]
    fn test_new_known_peer_has_no_contact() {
        let mut registry = PeerRegistry::new(2);
        registry.promote_to_known(addr(1)).unwrap();
        let peer = registry.peer(&addr(1)).unwrap();
        assert!(!peer.awaiting_reply);
        assert!(peer.last_contact.is_none());
    }

    #[test]
    fn test_liveness_marks() {
        let mut registry = PeerRegistry::new(2);
        registry.promote_to_known(addr(1)).unwrap();
        let t0 = Instant::now();

        assert!(registry.mark_probe_sent(&addr(1), t0));
        let peer = registry.peer(&addr(1)).unwrap();
        assert!(peer.awaiting_reply);
        assert_eq!(peer.last_contact, Some(t0));

        let t1 = t0 + Duration::from_secs(3);
        assert!(registry.mark_replied(&addr(1), t1));
        let peer = registry.peer(&addr(1)).unwrap();
        assert!(!peer.awaiting_reply);
        assert_eq!(peer.last_contact, Some(t1));

        let t2 = t1 + Duration::from_secs(10);
        registry.mark_probe_sent(&addr(1), t2);
        registry.mark_probe_sent(&addr(1), t2 + Duration::from_secs(10));
        assert_eq!(registry.peer(&addr(1)).unwrap().last_contact, Some(t2));

        assert!(!registry.mark_probe_sent(&addr(9), t1));
        assert!(!registry.clear_awaiting(&addr(9)));
    }

    #[test]
    fn test_peers_exceeding_timeout() {
        let mut registry = PeerRegistry::new(4);
        for last in 1..=3 {
            registry.promote_to_known(addr(last)).unwrap();
        }
        let t0 = Instant::now();
        let timeout = Duration::from_secs(20);

        // 1: probed, silent. 2: probed, answered. 3: never probed.
        registry.mark_probe_sent(&addr(1), t0);
        registry.mark_probe_sent(&addr(2), t0);
        registry.mark_replied(&addr(2), t0 + Duration::from_secs(1));

        let at_limit = t0 + timeout;
        assert_eq!(registry.peers_exceeding_timeout(at_limit, timeout).count(), 0);

        let late = t0 + Duration::from_secs(21);
        let overdue: Vec<_> = registry.peers_exceeding_timeout(late, timeout).collect();
        assert_eq!(overdue, vec![addr(1)]);

        // Does not mutate; calling again yields the same set.
        let again: Vec<_> = registry.peers_exceeding_timeout(late, timeout).collect();
        assert_eq!(again, overdue);

        registry.clear_awaiting(&addr(1));
        assert_eq!(registry.peers_exceeding_timeout(late, timeout).count(), 0);
        assert_eq!(registry.peer(&addr(1)).unwrap().last_contact, Some(t0));
    }

    #[test]
    fn test_revert_restores_previous_liveness() {
        let mut registry = PeerRegistry::new(4);
        registry.promote_to_known(addr(1)).unwrap();
        registry.promote_to_known(addr(2)).unwrap();
        let t0 = Instant::now();

        let before = *registry.peer(&addr(1)).unwrap();
        registry.mark_probe_sent(&addr(1), t0);
        assert!(registry.revert_probe(&before));
        assert_eq!(*registry.peer(&addr(1)).unwrap(), before);

        // A reply that landed first wins.
        let before = *registry.peer(&addr(2)).unwrap();
        registry.mark_probe_sent(&addr(2), t0);
        registry.mark_replied(&addr(2), t0 + Duration::from_secs(1));
        registry.revert_probe(&before);
        let peer = registry.peer(&addr(2)).unwrap();
        assert!(!peer.awaiting_reply);
        assert_eq!(peer.last_contact, Some(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_reply_removes_overdue_peer() {
        let mut registry = PeerRegistry::new(4);
        registry.promote_to_known(addr(1)).unwrap();
        let t0 = Instant::now();
        let timeout = Duration::from_secs(20);
        registry.mark_probe_sent(&addr(1), t0);

        let late = t0 + Duration::from_secs(25);
        assert_eq!(
            registry.peers_exceeding_timeout(late, timeout).collect::<Vec<_>>(),
            vec![addr(1)]
        );

        registry.mark_replied(&addr(1), late);
        assert_eq!(registry.peers_exceeding_timeout(late, timeout).count(), 0);
        assert_eq!(
            registry
                .peers_exceeding_timeout(late + Duration::from_secs(60), timeout)
                .count(),
            0
        );
    }

    #[test]
    fn test_eleventh_peer_rejected_at_default_capacity() {
        let mut registry = PeerRegistry::default();
        assert_eq!(registry.capacity(), 10);
        for last in 1..=10 {
            assert_eq!(registry.note_unknown(addr(last)).unwrap(), InsertOutcome::Added);
        }
        let before: Vec<_> = registry.unknown_peers().copied().collect();

        assert!(matches!(
            registry.note_unknown(addr(11)),
            Err(RadiowireError::RegistryFull {
                list: PeerList::Unknown,
                capacity: 10
            })
        ));
        assert_eq!(registry.unknown_peers().copied().collect::<Vec<_>>(), before);
        assert_eq!(registry.unknown_count(), 10);
    }

    #[test]
    fn test_shared_registry_clones_share_state() {
        let shared = SharedRegistry::new(PeerRegistry::new(4));
        let other = shared.clone();
        other.lock().promote_to_known(addr(5)).unwrap();
        assert!(shared.is_known(&addr(5)));
        assert_eq!(shared.known_addresses(), vec![addr(5)]);
    }

    #[test]
    fn test_peer_list_display() {
        assert_eq!(PeerList::Known.to_string(), "known");
        assert_eq!(PeerList::Unknown.to_string(), "unknown");
    }
}
