//! Peer presence, derived from ledger heartbeats.
//!
//! There is no separate presence message: every [LedgerMessage](crate::world_view::serial::LedgerMessage)
//! refreshes its origin. A peer not heard from within the disconnect timeout is lost.

use std::collections::{BTreeMap, BTreeSet};
use tokio::time::{Duration, Instant};

use crate::world_view::NodeId;

/// Membership change of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    /// First message from a peer, or first after it was lost
    Joined(NodeId),
    /// No message from the peer within the timeout
    Lost(NodeId),
}

/// Tracks when each peer was last heard from.
#[derive(Debug, Clone)]
pub struct PeerWatchdog {
    self_id: NodeId,
    timeout: Duration,
    last_seen: BTreeMap<NodeId, Instant>,
}

impl PeerWatchdog {
    #[allow(missing_docs)]
    pub fn new(self_id: NodeId, timeout: Duration) -> Self {
        Self { self_id, timeout, last_seen: BTreeMap::new() }
    }

    /// A message from `id` arrived. Own messages looped back by the broadcast are ignored.
    ///
    /// ## Returns
    /// - [PeerEvent::Joined] if the peer was not considered alive.
    pub fn heard(&mut self, id: NodeId) -> Option<PeerEvent> {
        if id == self.self_id {
            return None;
        }
        match self.last_seen.insert(id, Instant::now()) {
            None => Some(PeerEvent::Joined(id)),
            Some(_) => None,
        }
    }

    /// Removes every peer not heard from within the timeout.
    ///
    /// ## Returns
    /// - One [PeerEvent::Lost] per removed peer, in id order.
    pub fn check(&mut self) -> Vec<PeerEvent> {
        let timeout = self.timeout;
        let lost: Vec<NodeId> = self.last_seen.iter()
            .filter(|(_, seen)| seen.elapsed() > timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &lost {
            self.last_seen.remove(id);
        }
        lost.into_iter().map(PeerEvent::Lost).collect()
    }

    /// Peers currently considered alive, not including this node
    pub fn alive(&self) -> BTreeSet<NodeId> {
        self.last_seen.keys().copied().collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn join_once_then_lose_after_silence() {
        let mut wd = PeerWatchdog::new(1, Duration::from_millis(1500));
        assert_eq!(wd.heard(2), Some(PeerEvent::Joined(2)));
        assert_eq!(wd.heard(2), None);
        assert_eq!(wd.heard(3), Some(PeerEvent::Joined(3)));

        tokio::time::advance(Duration::from_millis(1000)).await;
        wd.heard(3);
        assert!(wd.check().is_empty());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(wd.check(), vec![PeerEvent::Lost(2)]);
        assert_eq!(wd.alive(), BTreeSet::from([3]));

        assert_eq!(wd.heard(2), Some(PeerEvent::Joined(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn own_loopback_is_not_a_peer() {
        let mut wd = PeerWatchdog::new(1, Duration::from_millis(100));
        assert_eq!(wd.heard(1), None);
        assert!(wd.alive().is_empty());
    }
}
