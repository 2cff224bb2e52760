//! ## WorldView Module
//!
//! This module defines the central data structures of a node's belief about the fleet:
//! the [`WorldView`] (hall-request ledger + one [`ElevatorContainer`] per known elevator).
//!
//! The worldview is **not** an authoritative object. Every node holds its own copy,
//! writes only its own elevator container and its own observations, and converges with
//! the rest of the fleet by merging the [`serial::LedgerMessage`]s it receives
//! (see [`world_view_update`]).
//!
//! ### Sub-modules
//! - [`hall_request`]: the per-call consensus record and its merge rule.
//! - [`world_view_update`]: ingest validation and merging of peer messages.
//! - [`serial`]: the versioned wire format.

pub mod hall_request;
pub mod serial;
pub mod world_view_update;

use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config;
use hall_request::{HallRequest, RequestStatus};

/// Identifier of a node (and of the elevator it controls).
pub type NodeId = u8;

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Direction an elevator is moving, or about to move, in.
pub enum Dirn {
    Down = -1,
    Stop = 0,
    Up = 1,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// The current behaviour of an elevator
pub enum ElevatorBehaviour {
    Idle,
    Moving,
    DoorOpen,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// Direction of a hall call. The discriminant is the column in a `[_; 2]` hall table.
pub enum HallDirn {
    Up = 0,
    Down = 1,
}

impl HallDirn {
    /// Both hall directions, in table order.
    pub const ALL: [HallDirn; 2] = [HallDirn::Up, HallDirn::Down];

    /// Column index in a `[_; 2]` hall table.
    pub fn idx(self) -> usize {
        self as usize
    }
}

/// A hall call: one button on the outside of the shaft.
///
/// Up and down on the same floor are independent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HallCall {
    /// Floor the button sits on
    pub floor: u8,
    /// Which of the two buttons
    pub dirn: HallDirn,
}

impl HallCall {
    #[allow(missing_docs)]
    pub fn new(floor: u8, dirn: HallDirn) -> Self {
        Self { floor, dirn }
    }
}


/// Represents the state of one elevator, as published by its owner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElevatorContainer {
    /// Unique identifier for the elevator.
    /// Default: [config::ERROR_ID]
    pub elevator_id: NodeId,

    /// The number of floors the elevator can access
    /// Default: [config::DEFAULT_NUM_FLOORS]
    pub num_floors: u8,

    /// The last floor the elevator passed. `None` until the first floor sensor reading.
    pub floor: Option<u8>,

    /// The current behaviour of the elevator
    /// Default: [ElevatorBehaviour::Idle]
    pub behaviour: ElevatorBehaviour,

    /// [Dirn]
    /// Default: [Dirn::Stop]
    pub dirn: Dirn,

    /// Cab calls. Owned by this elevator only, shared for visibility and recovery.
    pub cab_requests: Vec<bool>,

    /// Hall calls the assigner currently gives this elevator
    pub tasks: Vec<[bool; 2]>,

    /// Whether the obstruction switch is active
    pub obstruction: bool,

    /// Door has been held open by an obstruction for longer than [config::OBSTRUCTION_TIMEOUT]
    pub door_stuck: bool,

    /// Motor has not reached a floor within [config::TRAVEL_TIMEOUT]
    pub motor_stuck: bool,

    /// Whether the elevator accepts new hall calls
    pub available: bool,

    /// Bumped by the owner on every heartbeat. Higher always wins when merging.
    pub version: u64,
}

impl Default for ElevatorContainer {
    fn default() -> Self {
        Self {
            elevator_id: config::ERROR_ID,
            num_floors: config::DEFAULT_NUM_FLOORS,
            floor: None,
            behaviour: ElevatorBehaviour::Idle,
            dirn: Dirn::Stop,
            cab_requests: vec![false; config::DEFAULT_NUM_FLOORS as usize],
            tasks: vec![[false; 2]; config::DEFAULT_NUM_FLOORS as usize],
            obstruction: false,
            door_stuck: false,
            motor_stuck: false,
            available: true,
            version: 0,
        }
    }
}

impl ElevatorContainer {
    /// Creates an idle container with empty request tables for `num_floors` floors.
    pub fn new(elevator_id: NodeId, num_floors: u8) -> Self {
        Self {
            elevator_id,
            num_floors,
            cab_requests: vec![false; num_floors as usize],
            tasks: vec![[false; 2]; num_floors as usize],
            ..Default::default()
        }
    }

    /// Whether the elevator can be handed to the cost function: known floor, no fault.
    pub fn is_assignable(&self) -> bool {
        self.available && !self.door_stuck && !self.motor_stuck
            && self.floor.map_or(false, |f| f < self.num_floors)
    }
}


/// Represents one node's belief about the whole system.
///
/// Only `hall_requests` and `elevator_containers` are shared with peers; `alive` is
/// local knowledge derived from heartbeats.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldView {
    /// The node holding this worldview
    pub self_id: NodeId,

    /// Number of floors of the fleet
    pub num_floors: u8,

    /// One consensus record per hall call, indexed `[floor][HallDirn]`
    pub hall_requests: Vec<[HallRequest; 2]>,

    /// Latest snapshot of every elevator ever heard from, including disconnected ones
    pub elevator_containers: BTreeMap<NodeId, ElevatorContainer>,

    /// Nodes currently believed to be connected. Always contains `self_id`.
    pub alive: BTreeSet<NodeId>,
}

impl WorldView {
    /// Creates a worldview containing only this node.
    pub fn new(self_id: NodeId, num_floors: u8) -> Self {
        let mut elevator_containers = BTreeMap::new();
        elevator_containers.insert(self_id, ElevatorContainer::new(self_id, num_floors));
        Self {
            self_id,
            num_floors,
            hall_requests: vec![[HallRequest::default(), HallRequest::default()]; num_floors as usize],
            elevator_containers,
            alive: BTreeSet::from([self_id]),
        }
    }

    /// Returns the record for `call`, if the floor exists.
    pub fn request(&self, call: HallCall) -> Option<&HallRequest> {
        self.hall_requests.get(call.floor as usize).map(|row| &row[call.dirn.idx()])
    }

    /// Mutable access to the record for `call`, if the floor exists.
    pub fn request_mut(&mut self, call: HallCall) -> Option<&mut HallRequest> {
        self.hall_requests.get_mut(call.floor as usize).map(|row| &mut row[call.dirn.idx()])
    }

    /// Iterates over every hall call slot together with its record.
    pub fn requests(&self) -> impl Iterator<Item = (HallCall, &HallRequest)> {
        self.hall_requests.iter().enumerate().flat_map(|(floor, row)| {
            HallDirn::ALL.into_iter().map(move |dirn| (HallCall::new(floor as u8, dirn), &row[dirn.idx()]))
        })
    }

    /// Table of hall calls with `status`, in the `[floor][HallDirn]` layout the assigner uses.
    pub fn hall_table(&self, status: RequestStatus) -> Vec<[bool; 2]> {
        self.hall_requests.iter()
            .map(|row| [row[0].status == status, row[1].status == status])
            .collect()
    }

    /// This node's own elevator container.
    pub fn self_container(&self) -> Option<&ElevatorContainer> {
        self.elevator_containers.get(&self.self_id)
    }

    /// Mutable access to this node's own elevator container.
    pub fn self_container_mut(&mut self) -> Option<&mut ElevatorContainer> {
        self.elevator_containers.get_mut(&self.self_id)
    }

    /// Whether `id` is currently believed to be connected.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.alive.contains(&id)
    }

    /// Containers of connected elevators that can take new hall calls.
    pub fn assignable_containers(&self) -> BTreeMap<NodeId, ElevatorContainer> {
        self.elevator_containers.iter()
            .filter(|(id, elev)| self.is_alive(**id) && elev.is_assignable())
            .map(|(id, elev)| (*id, elev.clone()))
            .collect()
    }
}
