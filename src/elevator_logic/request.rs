//! Elevator request evaluation and direction decision logic.
//!
//! Stateless helpers for the motion state machine in [`super::fsm`] and for the
//! simulation in [`crate::manager::cost`]. Every function takes a snapshot
//! ([`ElevatorContainer`]) and looks at its `tasks` (assigned hall calls) and `cab_requests`.
//!
//! An elevator without a known floor has no requests above, below or here; it only moves
//! to find a floor, which [`super::fsm`] handles on its own.
//!
//! # Clear policy
//! Requests are cleared *in direction*: stopping on the way up serves the cab call and the
//! up call of the floor. The down call is only served when the car turns around there.
//!
//! # Example
//! ```
//! use elevator_sync::elevator_logic::request::{choose_direction, should_stop};
//! use elevator_sync::world_view::{ElevatorContainer, ElevatorBehaviour, Dirn};
//!
//! let mut elevator = ElevatorContainer::new(1, 4);
//! elevator.floor = Some(0);
//! elevator.cab_requests[2] = true;
//!
//! let pair = choose_direction(&elevator);
//! assert_eq!((pair.dirn, pair.behaviour), (Dirn::Up, ElevatorBehaviour::Moving));
//!
//! elevator.dirn = Dirn::Up;
//! elevator.floor = Some(1);
//! assert!(!should_stop(&elevator));
//! ```

use crate::world_view::{Dirn, ElevatorBehaviour, ElevatorContainer, HallCall, HallDirn};

/// Represents a combination of a direction and an elevator behaviour state.
///
/// Typically used as the return type for direction decision functions,
/// such as in the elevator finite state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirnBehaviourPair {
    /// direction of the elevator
    pub dirn: Dirn,

    /// the behavior of the elevator
    pub behaviour: ElevatorBehaviour,
}

fn current_floor(elevator: &ElevatorContainer) -> Option<usize> {
    elevator.floor
        .map(|f| f as usize)
        .filter(|f| *f < elevator.tasks.len() && *f < elevator.cab_requests.len())
}

fn any_at(elevator: &ElevatorContainer, floor: usize) -> bool {
    elevator.tasks[floor].iter().any(|t| *t) || elevator.cab_requests[floor]
}

/// Checks if there are any hall or cab requests above the elevator's current floor.
fn above(elevator: &ElevatorContainer) -> bool {
    match current_floor(elevator) {
        Some(floor) => ((floor + 1)..elevator.tasks.len().min(elevator.cab_requests.len()))
            .any(|f| any_at(elevator, f)),
        None => false,
    }
}

/// Checks if there are any hall or cab requests below the elevator's current floor.
fn below(elevator: &ElevatorContainer) -> bool {
    match current_floor(elevator) {
        Some(floor) => (0..floor).any(|f| any_at(elevator, f)),
        None => false,
    }
}

/// Checks for any pending tasks or cab requests at the elevator's current floor.
fn here(elevator: &ElevatorContainer) -> bool {
    current_floor(elevator).map_or(false, |floor| any_at(elevator, floor))
}

/// Whether the elevator has anything at all to do.
pub fn has_requests(elevator: &ElevatorContainer) -> bool {
    elevator.cab_requests.iter().any(|c| *c)
        || elevator.tasks.iter().any(|row| row.iter().any(|t| *t))
}

/// Main decision logic to determine the elevator's next direction and behaviour.
///
/// Keeps going in the current direction while there are requests ahead, serves the current
/// floor before turning around, and goes idle when nothing is left.
///
/// # Parameters
/// - `elevator`: Reference to the elevator's internal state.
///
/// # Returns
/// A `DirnBehaviourPair` representing the chosen direction and behaviour state.
pub fn choose_direction(elevator: &ElevatorContainer) -> DirnBehaviourPair {
    let pair = |dirn, behaviour| DirnBehaviourPair { dirn, behaviour };
    match elevator.dirn {
        Dirn::Up => {
            if above(elevator) {
                pair(Dirn::Up, ElevatorBehaviour::Moving)
            } else if here(elevator) {
                pair(Dirn::Down, ElevatorBehaviour::DoorOpen)
            } else if below(elevator) {
                pair(Dirn::Down, ElevatorBehaviour::Moving)
            } else {
                pair(Dirn::Stop, ElevatorBehaviour::Idle)
            }
        }
        Dirn::Down => {
            if below(elevator) {
                pair(Dirn::Down, ElevatorBehaviour::Moving)
            } else if here(elevator) {
                pair(Dirn::Up, ElevatorBehaviour::DoorOpen)
            } else if above(elevator) {
                pair(Dirn::Up, ElevatorBehaviour::Moving)
            } else {
                pair(Dirn::Stop, ElevatorBehaviour::Idle)
            }
        }
        Dirn::Stop => {
            if here(elevator) {
                pair(Dirn::Stop, ElevatorBehaviour::DoorOpen)
            } else if above(elevator) {
                pair(Dirn::Up, ElevatorBehaviour::Moving)
            } else if below(elevator) {
                pair(Dirn::Down, ElevatorBehaviour::Moving)
            } else {
                pair(Dirn::Stop, ElevatorBehaviour::Idle)
            }
        }
    }
}

/// Determines whether the elevator should stop at the current floor.
///
/// Stops for a cab call here, a hall call here in the travel direction, or when nothing
/// is left ahead. An elevator with unknown floor never stops by this rule.
pub fn should_stop(elevator: &ElevatorContainer) -> bool {
    let Some(floor) = current_floor(elevator) else {
        return false;
    };

    if elevator.cab_requests[floor] {
        return true;
    }

    match elevator.dirn {
        Dirn::Down => elevator.tasks[floor][HallDirn::Down.idx()] || !below(elevator),
        Dirn::Up => elevator.tasks[floor][HallDirn::Up.idx()] || !above(elevator),
        Dirn::Stop => true,
    }
}

/// Whether a request at the current floor can be served right away by an elevator standing
/// there with its door open, without having to leave first.
pub fn should_clear_immediately(elevator: &ElevatorContainer) -> bool {
    let Some(floor) = current_floor(elevator) else {
        return false;
    };
    let up = elevator.tasks[floor][HallDirn::Up.idx()];
    let down = elevator.tasks[floor][HallDirn::Down.idx()];

    elevator.cab_requests[floor]
        || match elevator.dirn {
            Dirn::Up => up,
            Dirn::Down => down,
            Dirn::Stop => up || down,
        }
}

/// Clears the requests at the elevator's current floor that are served by stopping there
/// in its current direction.
///
/// # Returns
/// The hall calls that were cleared. These are the completions the fleet ledger must hear about.
pub fn clear_at_current_floor(elevator: &mut ElevatorContainer) -> Vec<HallCall> {
    let Some(floor) = current_floor(elevator) else {
        return Vec::new();
    };
    elevator.cab_requests[floor] = false;

    let mut clear = Vec::with_capacity(2);
    match elevator.dirn {
        Dirn::Up => {
            if !above(elevator) && !elevator.tasks[floor][HallDirn::Up.idx()] {
                clear.push(HallDirn::Down);
            }
            clear.push(HallDirn::Up);
        }
        Dirn::Down => {
            if !below(elevator) && !elevator.tasks[floor][HallDirn::Down.idx()] {
                clear.push(HallDirn::Up);
            }
            clear.push(HallDirn::Down);
        }
        Dirn::Stop => {
            clear.push(HallDirn::Up);
            clear.push(HallDirn::Down);
        }
    }

    clear.into_iter()
        .filter(|dirn| std::mem::replace(&mut elevator.tasks[floor][dirn.idx()], false))
        .map(|dirn| HallCall::new(floor as u8, dirn))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn at(floor: u8, dirn: Dirn) -> ElevatorContainer {
        let mut e = ElevatorContainer::new(1, 4);
        e.floor = Some(floor);
        e.dirn = dirn;
        e
    }

    #[test]
    fn unknown_floor_has_no_requests_anywhere() {
        let mut e = ElevatorContainer::new(1, 4);
        e.cab_requests[0] = true;
        e.tasks[3] = [true, true];
        assert_eq!(choose_direction(&e).behaviour, ElevatorBehaviour::Idle);
        assert!(!should_stop(&e));
        assert!(clear_at_current_floor(&mut e).is_empty());
        assert!(has_requests(&e));
    }

    #[test]
    fn keeps_direction_while_requests_ahead() {
        let mut e = at(1, Dirn::Up);
        e.tasks[3][HallDirn::Down.idx()] = true;
        e.tasks[0][HallDirn::Up.idx()] = true;
        assert_eq!(choose_direction(&e), DirnBehaviourPair { dirn: Dirn::Up, behaviour: ElevatorBehaviour::Moving });
    }

    #[test]
    fn passes_hall_calls_in_the_other_direction() {
        let mut e = at(2, Dirn::Up);
        e.tasks[2][HallDirn::Down.idx()] = true;
        e.cab_requests[3] = true;
        assert!(!should_stop(&e));

        e.cab_requests[3] = false;
        assert!(should_stop(&e));
    }

    #[test]
    fn clears_only_in_travel_direction() {
        let mut e = at(1, Dirn::Up);
        e.tasks[1] = [true, true];
        e.cab_requests[1] = true;
        e.cab_requests[3] = true;

        let cleared = clear_at_current_floor(&mut e);
        assert_eq!(cleared, vec![HallCall::new(1, HallDirn::Up)]);
        assert!(!e.cab_requests[1]);
        assert_eq!(e.tasks[1], [false, true]);
    }

    #[test]
    fn clears_both_when_turning_around() {
        let mut e = at(3, Dirn::Up);
        e.tasks[3][HallDirn::Down.idx()] = true;
        let cleared = clear_at_current_floor(&mut e);
        assert_eq!(cleared, vec![HallCall::new(3, HallDirn::Down)]);
        assert_eq!(e.tasks[3], [false, false]);
    }

    #[test]
    fn idle_elevator_opens_door_for_request_here() {
        let mut e = at(2, Dirn::Stop);
        e.tasks[2][HallDirn::Up.idx()] = true;
        assert_eq!(choose_direction(&e).behaviour, ElevatorBehaviour::DoorOpen);
        assert!(should_clear_immediately(&e));
    }

    #[test]
    fn door_open_does_not_serve_opposite_call_immediately() {
        let mut e = at(2, Dirn::Up);
        e.tasks[2][HallDirn::Down.idx()] = true;
        assert!(!should_clear_immediately(&e));
    }
}
