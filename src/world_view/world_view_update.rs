//! Help functions to update the local worldview
//!
//! Everything in here operates on a `&mut WorldView` owned by the synchronizer loop.
//! Nothing here does I/O; the functions are deterministic and tested in isolation.

use std::collections::{BTreeMap, BTreeSet};

use crate::config;
use crate::print;
use crate::world_view::{WorldView, ElevatorContainer, ElevatorBehaviour, Dirn, HallCall, NodeId};
use crate::world_view::hall_request::{HallRequest, Lifecycle, Observation, RequestStatus};
use crate::world_view::serial::LedgerMessage;


/// What merging one [LedgerMessage] changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeOutcome {
    /// At least one hall-request record changed
    pub ledger_changed: bool,

    /// At least one peer snapshot was adopted
    pub fleet_changed: bool,

    /// Cab calls a peer remembered for this node, newer than what this node knows.
    /// `Some` only right after a restart.
    pub recovered_cab_calls: Option<Vec<bool>>,
}


/// Makes a received message safe to merge.
///
/// - The hall-request table is resized to `num_floors` (extra rows dropped, missing rows Absent).
/// - Snapshots are resized to `num_floors`; floors outside the shaft become `None`.
/// - `Moving` with direction `Stop` is reported as `Idle`.
/// - Snapshots carrying [config::ERROR_ID] are dropped.
///
/// ## Parameters
/// - `msg`: The message, as decoded from the wire.
/// - `num_floors`: The receiver's floor count.
pub fn sanitize_message(msg: &mut LedgerMessage, num_floors: u8) {
    if msg.num_floors != num_floors {
        print::warn(format!(
            "Node {} runs with {} floors, local config has {}",
            msg.origin, msg.num_floors, num_floors
        ));
    }
    msg.hall_requests.resize_with(num_floors as usize, Default::default);
    msg.num_floors = num_floors;

    msg.elevators.retain(|elev| elev.elevator_id != config::ERROR_ID);
    for elev in msg.elevators.iter_mut() {
        sanitize_container(elev, num_floors);
    }
}

/// Clamps one snapshot to the local floor count. See [sanitize_message].
pub fn sanitize_container(elev: &mut ElevatorContainer, num_floors: u8) {
    elev.num_floors = num_floors;
    elev.cab_requests.resize(num_floors as usize, false);
    elev.tasks.resize(num_floors as usize, [false; 2]);

    if elev.floor.map_or(false, |f| f >= num_floors) {
        elev.floor = None;
    }
    if elev.behaviour == ElevatorBehaviour::Moving && elev.dirn == Dirn::Stop {
        elev.behaviour = ElevatorBehaviour::Idle;
    }
}


/// Merges a sanitized peer message into the local worldview.
///
/// Every hall-request record is joined with [HallRequest::merge], after which this node
/// acknowledges every record still waiting for a barrier. Snapshots of other elevators are
/// adopted when their version is higher. A snapshot of this node is never adopted; it is
/// only used to recover cab calls after a restart.
///
/// ## Parameters
/// - `wv`: The local worldview.
/// - `msg`: A message that has been through [sanitize_message].
///
/// ## Returns
/// - A [MergeOutcome] describing what changed.
pub fn merge_message(wv: &mut WorldView, msg: &LedgerMessage) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for (local_row, peer_row) in wv.hall_requests.iter_mut().zip(msg.hall_requests.iter()) {
        for (local, peer) in local_row.iter_mut().zip(peer_row.iter()) {
            outcome.ledger_changed |= local.merge(peer);
        }
    }
    outcome.ledger_changed |= acknowledge_all(wv);

    for elev in &msg.elevators {
        if elev.elevator_id == wv.self_id {
            if let Some(cabs) = recover_self(wv, elev) {
                outcome.recovered_cab_calls = Some(cabs);
            }
            continue;
        }
        match wv.elevator_containers.get_mut(&elev.elevator_id) {
            Some(known) if known.version >= elev.version => {}
            Some(known) => {
                *known = elev.clone();
                outcome.fleet_changed = true;
            }
            None => {
                wv.elevator_containers.insert(elev.elevator_id, elev.clone());
                outcome.fleet_changed = true;
            }
        }
    }

    outcome
}

/// Adds this node to the awareness set of every record waiting for a barrier.
pub fn acknowledge_all(wv: &mut WorldView) -> bool {
    let self_id = wv.self_id;
    let mut changed = false;
    for row in wv.hall_requests.iter_mut() {
        for req in row.iter_mut() {
            changed |= req.acknowledge(self_id);
        }
    }
    changed
}

/// A peer remembers this node with a higher version than this node itself does: this node
/// restarted. Adopt the remembered cab calls and jump past the remembered version so the
/// fleet accepts the new snapshots.
fn recover_self(wv: &mut WorldView, remembered: &ElevatorContainer) -> Option<Vec<bool>> {
    let own = wv.self_container_mut()?;
    if remembered.version <= own.version {
        return None;
    }

    own.version = remembered.version + 1;
    let mut recovered = false;
    for (mine, theirs) in own.cab_requests.iter_mut().zip(remembered.cab_requests.iter()) {
        recovered |= *theirs && !*mine;
        *mine |= *theirs;
    }

    if recovered {
        print::ok(format!("Recovered cab calls from the fleet: {:?}", own.cab_requests));
        Some(own.cab_requests.clone())
    } else {
        None
    }
}


/// Moves every record past its barrier where the live set allows it.
///
/// ## Returns
/// - The calls whose status changed, with their new status.
pub fn advance_barriers(wv: &mut WorldView) -> Vec<(HallCall, RequestStatus)> {
    let live = wv.alive.clone();
    let mut advanced = Vec::new();
    for (floor, row) in wv.hall_requests.iter_mut().enumerate() {
        for (idx, req) in row.iter_mut().enumerate() {
            if req.advance(&live) {
                let dirn = crate::world_view::HallDirn::ALL[idx];
                advanced.push((HallCall::new(floor as u8, dirn), req.status));
            }
        }
    }
    advanced
}


/// A hall button was pressed on this node's hardware.
///
/// ## Returns
/// - `true` if this started a new lifecycle for the call.
pub fn observe_hall_call(wv: &mut WorldView, call: HallCall) -> bool {
    let self_id = wv.self_id;
    match wv.request_mut(call) {
        Some(req) => req.observe(self_id),
        None => {
            print::warn(format!("Ignoring hall button outside the shaft: {:?}", call));
            false
        }
    }
}

/// Re-checks the hall calls pressed on this node against the ledger.
///
/// `observed` holds the lifecycle each press belongs to. Presses whose lifecycle was served are
/// removed. Presses overridden by a lifecycle that never contained them, e.g. after a restart
/// or a partition, are observed again so the call is not lost.
///
/// ## Returns
/// - The calls that were observed again.
pub fn reclaim_observations(wv: &mut WorldView, observed: &mut BTreeMap<HallCall, Lifecycle>) -> Vec<HallCall> {
    let self_id = wv.self_id;
    let mut reissued = Vec::new();
    observed.retain(|call, lifecycle| {
        let Some(req) = wv.request_mut(*call) else { return false };
        match req.reclaim(self_id, *lifecycle) {
            Observation::Pending(current) => {
                *lifecycle = current;
                true
            }
            Observation::Served => false,
            Observation::Reissued(current) => {
                *lifecycle = current;
                reissued.push(*call);
                true
            }
        }
    });
    reissued
}

/// This node's elevator served `call`.
///
/// ## Returns
/// - The new Completed record, if the call was pending.
pub fn complete_hall_call(wv: &mut WorldView, call: HallCall) -> Option<HallRequest> {
    let self_id = wv.self_id;
    let req = wv.request_mut(call)?;
    if req.complete(self_id) {
        Some(req.clone())
    } else {
        None
    }
}


/// Copies the local elevator's published state into this node's own snapshot.
///
/// `tasks` and `version` are owned by the synchronizer and are kept.
///
/// ## Returns
/// - `true` if anything the fleet can see changed.
pub fn set_self_state(wv: &mut WorldView, state: &ElevatorContainer) -> bool {
    let num_floors = wv.num_floors;
    let Some(own) = wv.self_container_mut() else {
        print::cosmic_err("Own elevator container is missing from the worldview".to_string());
        return false;
    };

    let mut next = state.clone();
    sanitize_container(&mut next, num_floors);
    next.elevator_id = own.elevator_id;
    next.tasks = own.tasks.clone();
    next.version = own.version;

    let changed = *own != next;
    *own = next;
    changed
}


/// Peer `id` was heard from.
///
/// ## Returns
/// - `true` if the peer was not already considered alive.
pub fn mark_connected(wv: &mut WorldView, id: NodeId) -> bool {
    wv.alive.insert(id)
}

/// Peer `id` stopped heartbeating. Its snapshot is kept; it is only excluded from
/// barriers and from assignment.
///
/// ## Returns
/// - `true` if the peer was considered alive.
pub fn mark_disconnected(wv: &mut WorldView, id: NodeId) -> bool {
    if id == wv.self_id {
        return false;
    }
    wv.alive.remove(&id)
}

/// Nodes in `live` that have not yet seen the record for `call`.
pub fn unaware_peers(wv: &WorldView, call: HallCall) -> BTreeSet<NodeId> {
    match wv.request(call) {
        Some(req) => wv.alive.difference(&req.aware).copied().collect(),
        None => BTreeSet::new(),
    }
}
