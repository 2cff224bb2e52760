//! External `hall_request_assigner` backend.
//!
//! The executable takes the whole problem as JSON after `--input` and prints a JSON object
//! mapping elevator id to its `[floor][up, down]` task table.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use serde::{Serialize, Deserialize};
use tokio::process::Command;

use crate::config;
use crate::world_view::{Dirn, ElevatorBehaviour, ElevatorContainer, NodeId};

#[allow(non_snake_case)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ElevatorState {
    behaviour: String,
    floor: u8,
    direction: String,
    cabRequests: Vec<bool>,
}

#[allow(non_snake_case)]
#[derive(Debug, Serialize, Deserialize)]
struct HallRequests {
    hallRequests: Vec<[bool; 2]>,
    states: BTreeMap<String, ElevatorState>,
}

fn behaviour_str(behaviour: ElevatorBehaviour) -> &'static str {
    match behaviour {
        ElevatorBehaviour::Idle => "idle",
        ElevatorBehaviour::Moving => "moving",
        ElevatorBehaviour::DoorOpen => "doorOpen",
    }
}

fn direction_str(dirn: Dirn) -> &'static str {
    match dirn {
        Dirn::Up => "up",
        Dirn::Down => "down",
        Dirn::Stop => "stop",
    }
}

/// Builds the `--input` argument.
///
/// Elevators without a known floor are left out, they cannot be expressed in the format.
///
/// ## Returns
/// - `None` if no elevator can be included.
pub fn create_hall_request_json(
    hall_requests: &[[bool; 2]],
    elevators: &BTreeMap<NodeId, ElevatorContainer>,
) -> anyhow::Result<Option<String>> {
    let states: BTreeMap<String, ElevatorState> = elevators.iter()
        .filter_map(|(id, elev)| {
            let floor = elev.floor.filter(|f| *f < elev.num_floors)?;
            Some((id.to_string(), ElevatorState {
                behaviour: behaviour_str(elev.behaviour).to_string(),
                floor,
                direction: direction_str(elev.dirn).to_string(),
                cabRequests: elev.cab_requests.clone(),
            }))
        })
        .collect();

    if states.is_empty() {
        return Ok(None);
    }

    let request = HallRequests { hallRequests: hall_requests.to_vec(), states };
    Ok(Some(serde_json::to_string(&request).context("failed to serialize assigner input")?))
}

/// Parses and validates the assigner's output.
///
/// Every id must be one that was asked about, every table must have one row per floor, and
/// every requested call must be assigned exactly once. Anything else is an error.
pub fn parse_assignment(
    output: &str,
    hall_requests: &[[bool; 2]],
    elevators: &BTreeMap<NodeId, ElevatorContainer>,
) -> anyhow::Result<BTreeMap<NodeId, Vec<[bool; 2]>>> {
    let raw: HashMap<String, Vec<[bool; 2]>> = serde_json::from_str(output)
        .context("assigner output is not a task map")?;

    let mut out = BTreeMap::new();
    for (key, tasks) in raw {
        let id: NodeId = key.parse().with_context(|| format!("assigner returned unknown id {:?}", key))?;
        if !elevators.contains_key(&id) {
            bail!("assigner returned elevator {} that was not asked about", id);
        }
        if tasks.len() != hall_requests.len() {
            bail!("assigner returned {} floors for elevator {}, expected {}", tasks.len(), id, hall_requests.len());
        }
        out.insert(id, tasks);
    }

    for (floor, row) in hall_requests.iter().enumerate() {
        for dirn in 0..2 {
            let holders = out.values().filter(|t| t[floor][dirn]).count();
            if holders != row[dirn] as usize {
                bail!("call at floor {} (button {}) assigned {} times", floor, dirn, holders);
            }
        }
    }
    Ok(out)
}

/// Runs the assigner at `path`, bounded by [config::ASSIGNER_TIMEOUT].
pub async fn run_cost_algorithm(
    path: &Path,
    hall_requests: &[[bool; 2]],
    elevators: &BTreeMap<NodeId, ElevatorContainer>,
) -> anyhow::Result<BTreeMap<NodeId, Vec<[bool; 2]>>> {
    let Some(json_str) = create_hall_request_json(hall_requests, elevators)? else {
        return Ok(BTreeMap::new());
    };

    let run = Command::new(path)
        .arg("--input")
        .arg(&json_str)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(config::ASSIGNER_TIMEOUT, run).await
        .map_err(|_| anyhow!("assigner timed out after {:?}", config::ASSIGNER_TIMEOUT))?
        .with_context(|| format!("failed to start {}", path.display()))?;

    if !output.status.success() {
        bail!("assigner exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr).trim());
    }

    parse_assignment(&String::from_utf8_lossy(&output.stdout), hall_requests, elevators)
}
