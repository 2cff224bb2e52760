//! # Elevator motion state machine
//!
//! [`ElevatorFsm`] drives one car through `Idle`, `Moving` and `DoorOpen`. It owns the
//! local [`ElevatorContainer`] that is published to the fleet, and three timers:
//!
//! - **door**: how long the door stays open. Held while the obstruction switch is on.
//! - **obstruction**: an obstruction held longer than [config::OBSTRUCTION_TIMEOUT] while the
//!   door is open sets `door_stuck`.
//! - **travel**: moving longer than [config::TRAVEL_TIMEOUT] without reaching a floor sets
//!   `motor_stuck`.
//!
//! Either fault makes the elevator unavailable for new hall calls. Both clear on their own
//! once the obstruction is removed or the car reaches a floor.
//!
//! Every event handler returns the hall calls it served; the caller reports them as completions.

use std::io;
use tokio::time::Duration;

use crate::config;
use crate::elevio::ElevatorIo;
use crate::print;
use crate::world_view::{Dirn, ElevatorBehaviour, ElevatorContainer, HallCall, NodeId};

use super::request;
use super::timer::{self, Timer};


/// The local elevator, its published state and its timers.
pub struct ElevatorFsm<E: ElevatorIo> {
    io: E,
    /// State published to the fleet
    pub elevator: ElevatorContainer,
    initialized: bool,
    door_timer: Timer,
    obstruction_timer: Timer,
    travel_timer: Timer,
}

impl<E: ElevatorIo> ElevatorFsm<E> {
    /// Creates the state machine. Nothing is sent to the hardware until [ElevatorFsm::on_init].
    pub fn new(io: E, elevator_id: NodeId, num_floors: u8, door_open: Duration) -> Self {
        Self {
            io,
            elevator: ElevatorContainer::new(elevator_id, num_floors),
            initialized: false,
            door_timer: timer::new(door_open),
            obstruction_timer: timer::new(config::OBSTRUCTION_TIMEOUT),
            travel_timer: timer::new(config::TRAVEL_TIMEOUT),
        }
    }

    /// Brings the car to a known floor.
    ///
    /// On a floor the elevator is ready at once. Between floors it moves down until the
    /// first floor sensor event; see [ElevatorFsm::on_floor_arrival].
    pub fn on_init(&mut self) -> io::Result<()> {
        self.io.door_light(false)?;
        self.io.stop_light(false)?;
        match self.io.floor_sensor()? {
            Some(floor) => {
                self.io.motor_direction(Dirn::Stop)?;
                self.elevator.floor = Some(floor).filter(|f| *f < self.elevator.num_floors);
                self.io.floor_indicator(floor)?;
                self.initialized = true;
            }
            None => {
                print::info("Starting between floors, moving down".to_string());
                self.elevator.dirn = Dirn::Down;
                self.elevator.behaviour = ElevatorBehaviour::Moving;
                self.io.motor_direction(Dirn::Down)?;
                self.travel_timer.timer_start();
            }
        }
        Ok(())
    }

    /// The car reached `floor`.
    pub fn on_floor_arrival(&mut self, floor: u8) -> io::Result<Vec<HallCall>> {
        if floor >= self.elevator.num_floors {
            print::cosmic_err(format!("Floor sensor reported floor {}", floor));
            return Ok(Vec::new());
        }
        self.elevator.floor = Some(floor);
        self.io.floor_indicator(floor)?;

        if self.elevator.motor_stuck {
            print::ok("Motor recovered".to_string());
            self.elevator.motor_stuck = false;
            self.update_available();
        }

        if !self.initialized {
            self.initialized = true;
            self.io.motor_direction(Dirn::Stop)?;
            self.elevator.dirn = Dirn::Stop;
            self.elevator.behaviour = ElevatorBehaviour::Idle;
            self.travel_timer.timer_stop();
            return self.on_new_requests();
        }

        match self.elevator.behaviour {
            ElevatorBehaviour::Moving => {
                if request::should_stop(&self.elevator) {
                    self.io.motor_direction(Dirn::Stop)?;
                    self.travel_timer.timer_stop();
                    self.open_door()
                } else {
                    self.travel_timer.timer_start();
                    Ok(Vec::new())
                }
            }
            ElevatorBehaviour::Idle | ElevatorBehaviour::DoorOpen => Ok(Vec::new()),
        }
    }

    /// The door has been open long enough and nothing obstructs it.
    pub fn on_door_timeout(&mut self) -> io::Result<Vec<HallCall>> {
        if self.elevator.behaviour != ElevatorBehaviour::DoorOpen {
            return Ok(Vec::new());
        }

        let pair = request::choose_direction(&self.elevator);
        self.elevator.dirn = pair.dirn;
        self.elevator.behaviour = pair.behaviour;

        match pair.behaviour {
            ElevatorBehaviour::DoorOpen => {
                self.door_timer.timer_start();
                Ok(request::clear_at_current_floor(&mut self.elevator))
            }
            ElevatorBehaviour::Moving => {
                self.close_door()?;
                self.io.motor_direction(pair.dirn)?;
                self.travel_timer.timer_start();
                Ok(Vec::new())
            }
            ElevatorBehaviour::Idle => {
                self.close_door()?;
                Ok(Vec::new())
            }
        }
    }

    /// The obstruction switch changed.
    pub fn on_obstruction(&mut self, obstructed: bool) {
        self.elevator.obstruction = obstructed;
        if obstructed {
            if self.elevator.behaviour == ElevatorBehaviour::DoorOpen {
                self.obstruction_timer.timer_start();
            }
        } else {
            self.obstruction_timer.timer_stop();
            if self.elevator.door_stuck {
                print::ok("Obstruction removed".to_string());
                self.elevator.door_stuck = false;
            }
            if self.elevator.behaviour == ElevatorBehaviour::DoorOpen {
                self.door_timer.timer_start();
            }
        }
        self.update_available();
    }

    /// The stop button changed. Only the lamp follows it.
    pub fn on_stop_button(&mut self, pressed: bool) -> io::Result<()> {
        self.io.stop_light(pressed)
    }

    /// A cab button was pressed.
    pub fn on_cab_button(&mut self, floor: u8) -> io::Result<Vec<HallCall>> {
        match self.elevator.cab_requests.get_mut(floor as usize) {
            Some(cab) => *cab = true,
            None => return Ok(Vec::new()),
        }
        self.on_new_requests()
    }

    /// Cab calls remembered by the fleet from before a restart.
    pub fn on_cab_restore(&mut self, cabs: &[bool]) -> io::Result<Vec<HallCall>> {
        for (mine, restored) in self.elevator.cab_requests.iter_mut().zip(cabs) {
            *mine |= *restored;
        }
        self.on_new_requests()
    }

    /// The assigner handed this elevator a new set of hall calls.
    pub fn on_tasks_updated(&mut self, tasks: &[[bool; 2]]) -> io::Result<Vec<HallCall>> {
        let mut next = tasks.to_vec();
        next.resize(self.elevator.num_floors as usize, [false; 2]);
        if next == self.elevator.tasks {
            return Ok(Vec::new());
        }
        self.elevator.tasks = next;
        self.on_new_requests()
    }

    /// Evaluates all timers. Called periodically by the control loop.
    pub fn check_timers(&mut self) -> io::Result<Vec<HallCall>> {
        let door_open = self.elevator.behaviour == ElevatorBehaviour::DoorOpen;

        if self.elevator.obstruction && door_open && !self.obstruction_timer.is_active() {
            self.obstruction_timer.timer_start();
        }
        if self.obstruction_timer.timer_timeouted() && !self.elevator.door_stuck {
            print::warn("Door held open by obstruction, leaving the fleet's assignment".to_string());
            self.elevator.door_stuck = true;
        }

        if self.elevator.behaviour == ElevatorBehaviour::Moving
            && self.travel_timer.timer_timeouted()
            && !self.elevator.motor_stuck
        {
            print::err("No floor reached in time, motor considered stuck".to_string());
            self.elevator.motor_stuck = true;
        }
        self.update_available();

        if door_open && self.door_timer.timer_timeouted() && !self.elevator.obstruction {
            return self.on_door_timeout();
        }
        Ok(Vec::new())
    }

    /// Reacts to requests added while in any state.
    fn on_new_requests(&mut self) -> io::Result<Vec<HallCall>> {
        if !self.initialized {
            return Ok(Vec::new());
        }
        match self.elevator.behaviour {
            ElevatorBehaviour::DoorOpen => {
                if request::should_clear_immediately(&self.elevator) {
                    self.door_timer.timer_start();
                    Ok(request::clear_at_current_floor(&mut self.elevator))
                } else {
                    Ok(Vec::new())
                }
            }
            ElevatorBehaviour::Idle => {
                let pair = request::choose_direction(&self.elevator);
                self.elevator.dirn = pair.dirn;
                match pair.behaviour {
                    ElevatorBehaviour::DoorOpen => self.open_door(),
                    ElevatorBehaviour::Moving => {
                        self.elevator.behaviour = ElevatorBehaviour::Moving;
                        self.io.motor_direction(pair.dirn)?;
                        self.travel_timer.timer_start();
                        Ok(Vec::new())
                    }
                    ElevatorBehaviour::Idle => Ok(Vec::new()),
                }
            }
            ElevatorBehaviour::Moving => Ok(Vec::new()),
        }
    }

    fn open_door(&mut self) -> io::Result<Vec<HallCall>> {
        self.io.door_light(true)?;
        self.door_timer.timer_start();
        self.elevator.behaviour = ElevatorBehaviour::DoorOpen;
        if self.elevator.obstruction {
            self.obstruction_timer.timer_start();
        }
        Ok(request::clear_at_current_floor(&mut self.elevator))
    }

    fn close_door(&mut self) -> io::Result<()> {
        self.door_timer.timer_stop();
        self.obstruction_timer.timer_stop();
        self.io.door_light(false)
    }

    fn update_available(&mut self) {
        self.elevator.available = !self.elevator.door_stuck && !self.elevator.motor_stuck;
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::world_view::HallDirn;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Cmd {
        Motor(Dirn),
        Hall(HallCall, bool),
        Cab(u8, bool),
        Indicator(u8),
        Door(bool),
        Stop(bool),
    }

    /// Records every command and answers floor sensor reads from `floor`.
    #[derive(Clone, Default)]
    pub(crate) struct MockIo {
        pub cmds: Arc<Mutex<Vec<Cmd>>>,
        pub floor: Arc<Mutex<Option<u8>>>,
    }

    impl MockIo {
        pub fn take(&self) -> Vec<Cmd> {
            std::mem::take(&mut *self.cmds.lock().unwrap())
        }
        fn push(&self, cmd: Cmd) -> io::Result<()> {
            self.cmds.lock().unwrap().push(cmd);
            Ok(())
        }
    }

    impl ElevatorIo for MockIo {
        fn motor_direction(&self, dirn: Dirn) -> io::Result<()> { self.push(Cmd::Motor(dirn)) }
        fn hall_light(&self, call: HallCall, on: bool) -> io::Result<()> { self.push(Cmd::Hall(call, on)) }
        fn cab_light(&self, floor: u8, on: bool) -> io::Result<()> { self.push(Cmd::Cab(floor, on)) }
        fn floor_indicator(&self, floor: u8) -> io::Result<()> { self.push(Cmd::Indicator(floor)) }
        fn door_light(&self, on: bool) -> io::Result<()> { self.push(Cmd::Door(on)) }
        fn stop_light(&self, on: bool) -> io::Result<()> { self.push(Cmd::Stop(on)) }
        fn floor_sensor(&self) -> io::Result<Option<u8>> { Ok(*self.floor.lock().unwrap()) }
    }

    const DOOR: Duration = Duration::from_secs(3);

    fn fsm_at(floor: u8) -> (ElevatorFsm<MockIo>, MockIo) {
        let io = MockIo::default();
        *io.floor.lock().unwrap() = Some(floor);
        let mut fsm = ElevatorFsm::new(io.clone(), 1, 4, DOOR);
        fsm.on_init().unwrap();
        io.take();
        (fsm, io)
    }

    fn tasks_with(call: HallCall) -> Vec<[bool; 2]> {
        let mut tasks = vec![[false; 2]; 4];
        tasks[call.floor as usize][call.dirn.idx()] = true;
        tasks
    }

    #[tokio::test(start_paused = true)]
    async fn init_between_floors_moves_down_then_stops() {
        let io = MockIo::default();
        let mut fsm = ElevatorFsm::new(io.clone(), 1, 4, DOOR);
        fsm.on_init().unwrap();
        assert!(io.take().contains(&Cmd::Motor(Dirn::Down)));
        assert_eq!(fsm.elevator.floor, None);

        // Requests before a known floor are kept but not acted on
        assert!(fsm.on_cab_button(3).unwrap().is_empty());

        fsm.on_floor_arrival(1).unwrap();
        let cmds = io.take();
        assert!(cmds.contains(&Cmd::Motor(Dirn::Stop)));
        assert!(cmds.contains(&Cmd::Motor(Dirn::Up)));
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::Moving);
        assert_eq!(fsm.elevator.floor, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn serves_assigned_hall_call_and_reports_it() {
        let (mut fsm, io) = fsm_at(0);
        let call = HallCall::new(2, HallDirn::Up);

        assert!(fsm.on_tasks_updated(&tasks_with(call)).unwrap().is_empty());
        assert_eq!(io.take(), vec![Cmd::Motor(Dirn::Up)]);

        assert!(fsm.on_floor_arrival(1).unwrap().is_empty());
        let served = fsm.on_floor_arrival(2).unwrap();
        assert_eq!(served, vec![call]);
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::DoorOpen);
        assert!(io.take().contains(&Cmd::Door(true)));

        tokio::time::advance(DOOR + Duration::from_millis(10)).await;
        assert!(fsm.check_timers().unwrap().is_empty());
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::Idle);
        assert!(io.take().contains(&Cmd::Door(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn request_at_current_floor_opens_door_immediately() {
        let (mut fsm, io) = fsm_at(3);
        let call = HallCall::new(3, HallDirn::Down);
        assert_eq!(fsm.on_tasks_updated(&tasks_with(call)).unwrap(), vec![call]);
        assert_eq!(io.take(), vec![Cmd::Door(true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn obstruction_holds_door_and_marks_unavailable() {
        let (mut fsm, _io) = fsm_at(0);
        fsm.on_cab_button(0).unwrap();
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::DoorOpen);

        fsm.on_obstruction(true);
        tokio::time::advance(config::OBSTRUCTION_TIMEOUT + Duration::from_millis(10)).await;
        fsm.check_timers().unwrap();
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::DoorOpen);
        assert!(fsm.elevator.door_stuck);
        assert!(!fsm.elevator.available);

        fsm.on_obstruction(false);
        assert!(fsm.elevator.available);
        // The door gets a full period after the obstruction clears
        tokio::time::advance(DOOR - Duration::from_millis(100)).await;
        fsm.check_timers().unwrap();
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::DoorOpen);
        tokio::time::advance(Duration::from_millis(200)).await;
        fsm.check_timers().unwrap();
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn travel_timeout_marks_motor_stuck_until_next_floor() {
        let (mut fsm, _io) = fsm_at(0);
        fsm.on_cab_button(3).unwrap();
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::Moving);

        tokio::time::advance(config::TRAVEL_TIMEOUT + Duration::from_millis(10)).await;
        fsm.check_timers().unwrap();
        assert!(fsm.elevator.motor_stuck);
        assert!(!fsm.elevator.available);

        fsm.on_floor_arrival(1).unwrap();
        assert!(!fsm.elevator.motor_stuck);
        assert!(fsm.elevator.available);
    }

    #[tokio::test(start_paused = true)]
    async fn turning_around_serves_the_other_direction_after_door_cycle() {
        let (mut fsm, _io) = fsm_at(0);
        let mut tasks = vec![[false; 2]; 4];
        tasks[2] = [true, true];
        fsm.on_tasks_updated(&tasks).unwrap();

        let first = fsm.on_floor_arrival(1).unwrap();
        assert!(first.is_empty());
        let served = fsm.on_floor_arrival(2).unwrap();
        assert_eq!(served, vec![HallCall::new(2, HallDirn::Up)]);

        tokio::time::advance(DOOR + Duration::from_millis(10)).await;
        let served = fsm.check_timers().unwrap();
        assert_eq!(served, vec![HallCall::new(2, HallDirn::Down)]);
        assert_eq!(fsm.elevator.behaviour, ElevatorBehaviour::DoorOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_cab_calls_are_served() {
        let (mut fsm, io) = fsm_at(1);
        fsm.on_cab_restore(&[false, false, true, false]).unwrap();
        assert!(fsm.elevator.cab_requests[2]);
        assert_eq!(io.take(), vec![Cmd::Motor(Dirn::Up)]);
    }
}
