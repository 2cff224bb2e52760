//! ## Elevator I/O module for the local elevator
//!
//! The wire protocol towards the elevator server lives in [`elev`], the polling threads
//! that turn register reads into events in [`poll`].
//!
//! On top of that this module defines:
//! - [`CallButton`]: a pressed button, already split into hall and cab calls.
//! - [`HardwareEvent`]: everything the pollers report to the local elevator task.
//! - [`ElevatorIo`]: the output side of the hardware, so the motion logic can run against a mock.

pub mod elev;
pub mod poll;

use std::io;

use crate::print;
use crate::world_view::{Dirn, HallCall, HallDirn};


/// A pressed button on the local elevator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallButton {
    /// Button outside the shaft. Goes through the fleet ledger.
    Hall(HallCall),
    /// Button inside the car, for the given floor. Served by this elevator only.
    Cab(u8),
}

impl CallButton {
    /// Converts a raw `(floor, button code)` pair from the elevator server.
    ///
    /// Unknown codes are logged and dropped.
    ///
    /// # Examples
    /// ```
    /// # use elevator_sync::elevio::CallButton;
    /// # use elevator_sync::world_view::{HallCall, HallDirn};
    /// assert_eq!(CallButton::from_raw(2, 0), Some(CallButton::Hall(HallCall::new(2, HallDirn::Up))));
    /// assert_eq!(CallButton::from_raw(1, 2), Some(CallButton::Cab(1)));
    /// assert_eq!(CallButton::from_raw(1, 7), None);
    /// ```
    pub fn from_raw(floor: u8, code: u8) -> Option<Self> {
        match code {
            elev::HALL_UP => Some(CallButton::Hall(HallCall::new(floor, HallDirn::Up))),
            elev::HALL_DOWN => Some(CallButton::Hall(HallCall::new(floor, HallDirn::Down))),
            elev::CAB => Some(CallButton::Cab(floor)),
            _ => {
                print::cosmic_err(format!("Call type {} does not exist", code));
                None
            }
        }
    }
}


/// Events reported by the polling threads.
#[derive(Debug)]
pub enum HardwareEvent {
    /// A button went from released to pressed
    Button(CallButton),
    /// The car arrived at a floor
    Floor(u8),
    /// The obstruction switch changed
    Obstruction(bool),
    /// The stop button changed
    Stop(bool),
    /// The connection to the elevator server failed. Not recoverable.
    Fault(io::Error),
}


/// Output side of the elevator hardware.
///
/// Implemented by [`elev::Elevator`]. Every command may fail with the connection's I/O error.
pub trait ElevatorIo: Clone + Send + 'static {
    /// Drives the motor. [`Dirn::Stop`] stops it.
    fn motor_direction(&self, dirn: Dirn) -> io::Result<()>;
    /// Sets the lamp of a hall button
    fn hall_light(&self, call: HallCall, on: bool) -> io::Result<()>;
    /// Sets the lamp of a cab button
    fn cab_light(&self, floor: u8, on: bool) -> io::Result<()>;
    /// Shows `floor` on the floor indicator
    fn floor_indicator(&self, floor: u8) -> io::Result<()>;
    #[allow(missing_docs)]
    fn door_light(&self, on: bool) -> io::Result<()>;
    #[allow(missing_docs)]
    fn stop_light(&self, on: bool) -> io::Result<()>;
    /// Reads the floor sensor, `None` between floors
    fn floor_sensor(&self) -> io::Result<Option<u8>>;
}

impl ElevatorIo for elev::Elevator {
    fn motor_direction(&self, dirn: Dirn) -> io::Result<()> {
        let code = match dirn {
            Dirn::Up => elev::DIRN_UP,
            Dirn::Down => elev::DIRN_DOWN,
            Dirn::Stop => elev::DIRN_STOP,
        };
        elev::Elevator::motor_direction(self, code)
    }

    fn hall_light(&self, call: HallCall, on: bool) -> io::Result<()> {
        let code = match call.dirn {
            HallDirn::Up => elev::HALL_UP,
            HallDirn::Down => elev::HALL_DOWN,
        };
        self.call_button_light(call.floor, code, on)
    }

    fn cab_light(&self, floor: u8, on: bool) -> io::Result<()> {
        self.call_button_light(floor, elev::CAB, on)
    }

    fn floor_indicator(&self, floor: u8) -> io::Result<()> {
        elev::Elevator::floor_indicator(self, floor)
    }

    fn door_light(&self, on: bool) -> io::Result<()> {
        elev::Elevator::door_light(self, on)
    }

    fn stop_light(&self, on: bool) -> io::Result<()> {
        self.stop_button_light(on)
    }

    fn floor_sensor(&self) -> io::Result<Option<u8>> {
        elev::Elevator::floor_sensor(self)
    }
}
