//! # config.rs – Centralized Parameter Store
//!
//! This module holds all static program parameters used throughout the system,
//! plus the runtime [`Config`] that [`crate::init::parse_args`] builds from the command line.
//! Keeping configuration in one place makes tuning, experimentation, and testing easier.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use once_cell::sync::Lazy;

//
// ──────────────────────────────────────────────────────────────
//   1. NETWORK SETTINGS
// ──────────────────────────────────────────────────────────────
//

/// Port every node broadcasts its ledger on
pub const BROADCAST_PORT: u16 = 42069;

/// UDP broadcast listen address (bind address)
pub static BC_LISTEN_ADDR: &str = "0.0.0.0";

/// Broadcast address used for system-wide ledger messages
pub static BC_ADDR: &str = "255.255.255.255";

/// Default address of the local elevator server
pub static LOCAL_ELEV_IP: &str = "localhost:15657";

/// Broadcast key used to filter out foreign datagrams on the broadcast port
pub const KEY_STR: &str = "Gruppe 25";

/// Version of the ledger wire format. Bumped on every incompatible change.
pub const PROTOCOL_VERSION: u8 = 2;

/// Size of UDP receive buffer in bytes
pub const UDP_BUFFER: usize = u16::MAX as usize;

//
// ──────────────────────────────────────────────────────────────
//   2. SYSTEM & ELEVATOR PARAMETERS
// ──────────────────────────────────────────────────────────────
//

/// Default number of floors in Sanntidshallen setup
pub const DEFAULT_NUM_FLOORS: u8 = 4;

/// Duration between elevator hardware polls
pub const ELEV_POLL: Duration = Duration::from_millis(25);

/// Special error ID used to mark an elevator whose id could not be resolved
pub const ERROR_ID: u8 = 255;

/// Number of connection attempts to the elevator server before giving up
pub const HW_CONNECT_RETRIES: u32 = 5;

/// Delay before the first reconnect attempt, doubled on each retry
pub const HW_RETRY_DELAY: Duration = Duration::from_millis(200);

//
// ──────────────────────────────────────────────────────────────
//   3. TIMING & TIMEOUTS & INTERVALS
// ──────────────────────────────────────────────────────────────
//

/// Period of the local elevator control loop
pub const POLL_PERIOD: Duration = Duration::from_millis(10);

/// How long the door is held open when nothing obstructs it
pub const DOOR_OPEN_DURATION: Duration = Duration::from_secs(3);

/// Obstruction held longer than this while the door is open makes the node unavailable
pub const OBSTRUCTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Moving longer than this without reaching a floor makes the node unavailable
pub const TRAVEL_TIMEOUT: Duration = Duration::from_secs(7);

/// Interval between ledger heartbeats
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);

/// A peer not heard from within this window is considered disconnected
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// How often the peer watchdog is evaluated
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(100);

/// How often the assignment is re-derived even without triggering events
pub const ASSIGN_PERIOD: Duration = Duration::from_millis(500);

/// Delay between retransmissions of an unacknowledged completion
pub const COMPLETION_RETRANSMIT: Duration = Duration::from_millis(50);

/// Retransmissions of one completion before the outbox gives up on it
pub const COMPLETION_MAX_ATTEMPTS: u32 = 40;

/// How long an unavailable (but still heartbeating) elevator keeps its assigned hall calls
pub const UNAVAILABLE_GRACE: Duration = Duration::from_secs(10);

/// Upper bound on one run of an external assigner
pub const ASSIGNER_TIMEOUT: Duration = Duration::from_millis(400);

/// How often the ledger table is printed when enabled
pub const PRINT_PERIOD: Duration = Duration::from_millis(500);

//
// ──────────────────────────────────────────────────────────────
//   4. ASSIGNMENT COST PARAMETERS
// ──────────────────────────────────────────────────────────────
//

/// Simulated time to travel between two adjacent floors
pub const TRAVEL_TIME: Duration = Duration::from_secs(2);

/// Upper bound on simulated steps for a single time-to-idle estimate
pub const MAX_SIMULATION_STEPS: usize = 256;

//
// ──────────────────────────────────────────────────────────────
//   5. LOGGING CONFIGURATION
// ──────────────────────────────────────────────────────────────
//

/// A runtime switch for one print level
pub type PrintFlag = Lazy<Mutex<bool>>;

/// Enable/disable printing of the ledger table
pub static PRINT_WV_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Enable/disable printing of errors
pub static PRINT_ERR_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of warnings
pub static PRINT_WARN_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of success messages
pub static PRINT_OK_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of general info
pub static PRINT_INFO_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

//
// ──────────────────────────────────────────────────────────────
//   6. RUNTIME CONFIGURATION
// ──────────────────────────────────────────────────────────────
//

/// Settings that may differ between nodes of the same fleet.
///
/// Built once at start-up by [`crate::init::parse_args`] and handed by value to every task.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Explicit node id. `None` means: derive it from the local IP address.
    pub node_id: Option<u8>,

    /// Number of floors served by every elevator in the fleet
    pub num_floors: u8,

    /// Address of the elevator server (hardware or simulator)
    pub elev_addr: String,

    /// UDP port the ledger is broadcast on
    pub port: u16,

    /// Optional path to an external `hall_request_assigner` executable
    pub assigner: Option<PathBuf>,

    /// See [DOOR_OPEN_DURATION]
    pub door_open: Duration,

    /// See [HEARTBEAT_PERIOD]
    pub heartbeat: Duration,

    /// See [DISCONNECT_TIMEOUT]
    pub disconnect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: None,
            num_floors: DEFAULT_NUM_FLOORS,
            elev_addr: LOCAL_ELEV_IP.to_string(),
            port: BROADCAST_PORT,
            assigner: None,
            door_open: DOOR_OPEN_DURATION,
            heartbeat: HEARTBEAT_PERIOD,
            disconnect_timeout: DISCONNECT_TIMEOUT,
        }
    }
}
