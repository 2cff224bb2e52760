//! # Hall request record
//!
//! One [`HallRequest`] exists per hall call in every node's [`WorldView`](super::WorldView).
//! It is a small state machine:
//!
//! ```text
//! Absent --observe--> Unconfirmed --all live aware--> Confirmed --served--> Completed
//!    ^                                                                         |
//!    +------------------------------all live aware-----------------------------+
//! ```
//!
//! Records from peers are combined with [`HallRequest::merge`], a join over
//! `(version, status, origin, aware)`. Because the join is commutative, associative and idempotent,
//! the order, duplication or loss of broadcasts never changes the state the fleet converges to.

use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;

use super::NodeId;

#[allow(missing_docs)]
/// Lifecycle of one hall call.
///
/// The declaration order is the precedence used when two records share a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum RequestStatus {
    #[default]
    Absent,
    Unconfirmed,
    Confirmed,
    Completed,
}

/// Consensus record for one hall call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct HallRequest {
    /// Where in the lifecycle the call is
    pub status: RequestStatus,

    /// Bumped on every lifecycle step that starts a new phase (observe, complete, reset)
    pub version: u64,

    /// Node whose button press started the current lifecycle
    pub origin: NodeId,

    /// Nodes known to have seen this exact `(version, status, origin)`
    pub aware: BTreeSet<NodeId>,
}

/// Identity of one lifecycle of a hall call: the version it was observed at and the node that
/// observed it. Kept through completion and reset, so a node can tell whether a settled record
/// belongs to a press it made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lifecycle {
    /// Version of the Unconfirmed record that started it
    pub version: u64,
    /// Node where the button was pressed
    pub origin: NodeId,
}

/// What became of a local button press after a merge. See [`HallRequest::reclaim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The call is still waiting to be served, in this lifecycle.
    Pending(Lifecycle),
    /// The lifecycle holding the press was served.
    Served,
    /// The press was overridden by a lifecycle that never contained it and has been started again.
    Reissued(Lifecycle),
}

impl HallRequest {
    /// Joins `other` into `self`.
    ///
    /// - Higher `version` is adopted wholly.
    /// - Equal version: the higher [`RequestStatus`] is adopted wholly.
    /// - Equal version and status: the higher `origin` is adopted wholly.
    /// - Equal everything else: the awareness sets are united.
    ///
    /// ## Returns
    /// `true` if `self` changed.
    ///
    /// ## Example
    /// ```
    /// use elevator_sync::world_view::hall_request::{HallRequest, RequestStatus};
    ///
    /// let mut mine = HallRequest::default();
    /// let theirs = HallRequest { status: RequestStatus::Unconfirmed, version: 1, origin: 2, aware: [2].into() };
    /// assert!(mine.merge(&theirs));
    /// assert!(!mine.merge(&theirs));
    /// assert_eq!(mine, theirs);
    /// ```
    pub fn merge(&mut self, other: &HallRequest) -> bool {
        let key = (self.version, self.status, self.origin);
        let other_key = (other.version, other.status, other.origin);

        if other_key > key {
            *self = other.clone();
            return true;
        }
        if other_key < key {
            return false;
        }

        let before = self.aware.len();
        self.aware.extend(other.aware.iter().copied());
        self.aware.len() != before
    }

    /// Records that `id` has seen this record. Only phases that wait for a barrier track awareness.
    ///
    /// ## Returns
    /// `true` if `id` was added.
    pub fn acknowledge(&mut self, id: NodeId) -> bool {
        match self.status {
            RequestStatus::Unconfirmed | RequestStatus::Completed => self.aware.insert(id),
            RequestStatus::Absent | RequestStatus::Confirmed => false,
        }
    }

    /// A button for this call was pressed on `self_id`'s hardware.
    ///
    /// Starts a new lifecycle if the slot is free (Absent) or only waiting for its reset (Completed).
    /// A press on an already pending call changes nothing.
    pub fn observe(&mut self, self_id: NodeId) -> bool {
        match self.status {
            RequestStatus::Absent | RequestStatus::Completed => {
                self.start_phase(RequestStatus::Unconfirmed, self_id);
                self.origin = self_id;
                true
            }
            RequestStatus::Unconfirmed | RequestStatus::Confirmed => false,
        }
    }

    /// The lifecycle this record belongs to. `None` for a slot that was never used.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        let version = match self.status {
            RequestStatus::Unconfirmed | RequestStatus::Confirmed => self.version,
            RequestStatus::Completed => self.version.checked_sub(1)?,
            RequestStatus::Absent => self.version.checked_sub(2)?,
        };
        (version > 0).then_some(Lifecycle { version, origin: self.origin })
    }

    /// Checks a press made on `self_id` in lifecycle `observed` against the merged record.
    ///
    /// A settled record that does not descend from `observed` was started by someone who never
    /// saw the press, so the press is observed again on top of it.
    pub fn reclaim(&mut self, self_id: NodeId, observed: Lifecycle) -> Observation {
        if self.is_pending() {
            return match self.lifecycle() {
                Some(lifecycle) => Observation::Pending(lifecycle),
                None => Observation::Served,
            };
        }
        if self.lifecycle() == Some(observed) {
            return Observation::Served;
        }
        self.observe(self_id);
        match self.lifecycle() {
            Some(lifecycle) => Observation::Reissued(lifecycle),
            None => Observation::Served,
        }
    }

    /// `self_id` served this call.
    pub fn complete(&mut self, self_id: NodeId) -> bool {
        match self.status {
            RequestStatus::Unconfirmed | RequestStatus::Confirmed => {
                self.start_phase(RequestStatus::Completed, self_id);
                true
            }
            RequestStatus::Absent | RequestStatus::Completed => false,
        }
    }

    /// Advances the record past a barrier once every node in `live` is aware of it.
    ///
    /// - Unconfirmed becomes Confirmed at the same version, so copies still marked
    ///   Unconfirmed are overridden by precedence.
    /// - Completed becomes Absent at `version + 1` with nobody aware, so the slot can be reused
    ///   and stale Completed copies lose.
    pub fn advance(&mut self, live: &BTreeSet<NodeId>) -> bool {
        if !self.aware.is_superset(live) {
            return false;
        }
        match self.status {
            RequestStatus::Unconfirmed => {
                self.status = RequestStatus::Confirmed;
                true
            }
            RequestStatus::Completed => {
                self.status = RequestStatus::Absent;
                self.version += 1;
                self.aware.clear();
                true
            }
            RequestStatus::Absent | RequestStatus::Confirmed => false,
        }
    }

    /// Whether the call is waiting to be served
    pub fn is_pending(&self) -> bool {
        matches!(self.status, RequestStatus::Unconfirmed | RequestStatus::Confirmed)
    }

    fn start_phase(&mut self, status: RequestStatus, self_id: NodeId) {
        self.status = status;
        self.version += 1;
        self.aware = BTreeSet::from([self_id]);
    }
}
