//! Native hall-request assigner.
//!
//! Estimates, for every elevator, how long it needs to serve everything it has and go idle
//! ("time to idle") by simulating it with the same stop and clear rules the real elevator uses
//! ([crate::elevator_logic::request]). Hall calls are handed out one at a time, in floor order,
//! to the elevator that would be idle soonest with the call added. Ties go to the lowest id.
//!
//! The result only depends on the arguments, so every node computes the same assignment from
//! the same ledger.

use std::collections::BTreeMap;

use crate::config;
use crate::elevator_logic::request;
use crate::world_view::{Dirn, ElevatorBehaviour, ElevatorContainer, HallDirn, NodeId};

fn step(floor: u8, dirn: Dirn, num_floors: u8) -> u8 {
    match dirn {
        Dirn::Up if floor + 1 < num_floors => floor + 1,
        Dirn::Down if floor > 0 => floor - 1,
        _ => floor,
    }
}

/// Simulated time, in milliseconds, until `elevator` has served all its requests.
///
/// Returns `None` for an elevator without a known floor.
pub fn time_to_idle(elevator: &ElevatorContainer) -> Option<i64> {
    let mut e = elevator.clone();
    let mut floor = e.floor.filter(|f| *f < e.num_floors)?;
    let travel = config::TRAVEL_TIME.as_millis() as i64;
    let door = config::DOOR_OPEN_DURATION.as_millis() as i64;
    let mut duration = 0i64;

    match e.behaviour {
        ElevatorBehaviour::Idle => {
            let pair = request::choose_direction(&e);
            e.dirn = pair.dirn;
            if pair.behaviour == ElevatorBehaviour::Idle {
                return Some(duration);
            }
        }
        ElevatorBehaviour::Moving => {
            duration += travel / 2;
            floor = step(floor, e.dirn, e.num_floors);
            e.floor = Some(floor);
        }
        ElevatorBehaviour::DoorOpen => {
            duration -= door / 2;
        }
    }

    for _ in 0..config::MAX_SIMULATION_STEPS {
        if request::should_stop(&e) {
            request::clear_at_current_floor(&mut e);
            duration += door;
            e.dirn = request::choose_direction(&e).dirn;
            if e.dirn == Dirn::Stop {
                return Some(duration);
            }
        }
        floor = step(floor, e.dirn, e.num_floors);
        e.floor = Some(floor);
        duration += travel;
    }
    Some(duration)
}

/// Assigns every hall call set in `hall_requests` to exactly one of `elevators`.
///
/// ## Parameters
/// - `hall_requests`: Calls to hand out, `[floor][HallDirn]`.
/// - `elevators`: Candidates. Their own `tasks` are ignored; cab calls are kept.
///   Elevators without a known floor are skipped.
///
/// ## Returns
/// - One task table per candidate with a known floor. Empty if there is none, in which case
///   the calls stay pending.
pub fn assign(
    hall_requests: &[[bool; 2]],
    elevators: &BTreeMap<NodeId, ElevatorContainer>,
) -> BTreeMap<NodeId, Vec<[bool; 2]>> {
    let mut sims: BTreeMap<NodeId, ElevatorContainer> = elevators.iter()
        .filter(|(_, e)| e.floor.map_or(false, |f| f < e.num_floors))
        .map(|(id, e)| {
            let mut sim = e.clone();
            sim.tasks = vec![[false; 2]; e.num_floors as usize];
            (*id, sim)
        })
        .collect();

    if sims.is_empty() {
        return BTreeMap::new();
    }

    for (floor, row) in hall_requests.iter().enumerate() {
        for dirn in HallDirn::ALL {
            if !row[dirn.idx()] {
                continue;
            }

            let mut best: Option<(i64, NodeId)> = None;
            for (id, sim) in sims.iter() {
                if floor >= sim.tasks.len() {
                    continue;
                }
                let mut candidate = sim.clone();
                candidate.tasks[floor][dirn.idx()] = true;
                let Some(cost) = time_to_idle(&candidate) else { continue };
                // strict < keeps the lowest id on equal cost, BTreeMap iterates in id order
                if best.map_or(true, |(best_cost, _)| cost < best_cost) {
                    best = Some((cost, *id));
                }
            }

            if let Some((_, id)) = best {
                if let Some(sim) = sims.get_mut(&id) {
                    sim.tasks[floor][dirn.idx()] = true;
                }
            }
        }
    }

    sims.into_iter().map(|(id, sim)| (id, sim.tasks)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn idle_at(id: NodeId, floor: u8) -> ElevatorContainer {
        let mut e = ElevatorContainer::new(id, 4);
        e.floor = Some(floor);
        e
    }

    fn calls(list: &[(usize, HallDirn)]) -> Vec<[bool; 2]> {
        let mut t = vec![[false; 2]; 4];
        for (f, d) in list {
            t[*f][d.idx()] = true;
        }
        t
    }

    #[test]
    fn idle_without_requests_costs_nothing() {
        assert_eq!(time_to_idle(&idle_at(1, 2)), Some(0));
        assert_eq!(time_to_idle(&ElevatorContainer::new(1, 4)), None);
    }

    #[test]
    fn closest_idle_elevator_gets_the_call() {
        let elevators = BTreeMap::from([(1, idle_at(1, 0)), (2, idle_at(2, 3)), (3, idle_at(3, 3))]);
        let out = assign(&calls(&[(1, HallDirn::Up)]), &elevators);
        assert!(out[&1][1][0]);
        assert!(!out[&2][1][0] && !out[&3][1][0]);
    }

    #[test]
    fn equal_cost_goes_to_lowest_id() {
        let elevators = BTreeMap::from([(5, idle_at(5, 1)), (2, idle_at(2, 1))]);
        let out = assign(&calls(&[(3, HallDirn::Down)]), &elevators);
        assert!(out[&2][3][1]);
        assert!(!out[&5][3][1]);
    }

    #[test]
    fn every_call_is_assigned_exactly_once() {
        let elevators = BTreeMap::from([(1, idle_at(1, 0)), (2, idle_at(2, 3))]);
        let hall = calls(&[(0, HallDirn::Up), (1, HallDirn::Down), (2, HallDirn::Up), (3, HallDirn::Down)]);
        let out = assign(&hall, &elevators);
        for (floor, row) in hall.iter().enumerate() {
            for d in HallDirn::ALL {
                let holders = out.values().filter(|t| t[floor][d.idx()]).count();
                assert_eq!(holders, row[d.idx()] as usize, "floor {floor} {d:?}");
            }
        }
    }

    #[test]
    fn unknown_floor_is_never_a_candidate() {
        let elevators = BTreeMap::from([(1, ElevatorContainer::new(1, 4)), (2, idle_at(2, 3))]);
        let out = assign(&calls(&[(0, HallDirn::Up)]), &elevators);
        assert!(!out.contains_key(&1));
        assert!(out[&2][0][0]);

        let only_unknown = BTreeMap::from([(1, ElevatorContainer::new(1, 4))]);
        assert!(assign(&calls(&[(0, HallDirn::Up)]), &only_unknown).is_empty());
    }

    #[test]
    fn same_input_gives_same_output() {
        let mut busy = idle_at(3, 2);
        busy.behaviour = ElevatorBehaviour::Moving;
        busy.dirn = Dirn::Down;
        busy.cab_requests[0] = true;
        let elevators = BTreeMap::from([(1, idle_at(1, 3)), (3, busy), (7, idle_at(7, 0))]);
        let hall = calls(&[(1, HallDirn::Up), (2, HallDirn::Down), (3, HallDirn::Down)]);
        let first = assign(&hall, &elevators);
        for _ in 0..10 {
            assert_eq!(assign(&hall, &elevators), first);
        }
    }

    #[test]
    fn cab_calls_count_towards_the_cost() {
        let mut loaded = idle_at(1, 0);
        loaded.cab_requests[3] = true;
        let elevators = BTreeMap::from([(1, loaded), (2, idle_at(2, 0))]);
        let out = assign(&calls(&[(2, HallDirn::Down)]), &elevators);
        // 1 must reach floor 3 before it can turn around for 2-down
        assert!(out[&2][2][1]);
        assert!(!out[&1][2][1]);
    }
}
