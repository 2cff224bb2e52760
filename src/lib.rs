#![warn(missing_docs)]
//! # This projects library
//!
//! This library keeps a fleet of elevators in agreement about which hall calls exist and which
//! elevator serves them, with no master and over a lossy broadcast network.
//!
//! ## Overview
//! - **Config**: Handles configuration settings.
//! - **Init**: Command line arguments and node id.
//! - **World View**: The hall-request ledger, its merge rule and the wire format.
//! - **Manager**: Assignment of hall calls to elevators.
//! - **Network**: UDP broadcast, peer presence and retransmission.
//! - **Synchronizer**: The event loop owning the worldview.
//! - **Elevio**: Interface for elevator I/O.
//! - **Elevator Logic**: Motion state machine and lamps of the local elevator.

/// Global variables
pub mod config;

/// Help functions
pub mod ip_help_functions;

/// Initialize functions
pub mod init;

/// Print functions with color coding
pub mod print;

pub mod manager;

pub mod network;

/// Management of the system's world view.
pub mod world_view;

pub mod synchronizer;

/// Interface for elevator input/output. Only changes are documented here. For source code see: [https://github.com/TTK4145/driver-rust/tree/master/src/elevio]
pub mod elevio;

pub mod elevator_logic;
