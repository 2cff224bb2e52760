//! Button lamps of the local elevator, driven by the published worldview.

use std::io;
use tokio::sync::watch;

use crate::elevio::ElevatorIo;
use crate::world_view::{HallCall, HallDirn, WorldView};
use crate::world_view::hall_request::RequestStatus;


/// Button lamps of the local elevator.
///
/// Remembers what every lamp was last set to, so [Lights::update] only talks to the hardware
/// for lamps that change.
pub struct Lights<E: ElevatorIo> {
    io: E,
    hall: Vec<[Option<bool>; 2]>,
    cab: Vec<Option<bool>>,
}

/// Whether the button exists on the panel. There is no down button on the bottom floor and no
/// up button on the top floor.
fn has_button(call: HallCall, num_floors: u8) -> bool {
    match call.dirn {
        HallDirn::Up => call.floor + 1 < num_floors,
        HallDirn::Down => call.floor > 0,
    }
}

impl<E: ElevatorIo> Lights<E> {
    #[allow(missing_docs)]
    pub fn new(io: E, num_floors: u8) -> Self {
        Self {
            io,
            hall: vec![[None; 2]; num_floors as usize],
            cab: vec![None; num_floors as usize],
        }
    }

    /// Sets the lamps from `wv`.
    ///
    /// ## Behavior
    /// - A hall lamp is on while the call is [RequestStatus::Confirmed], on every node.
    /// - A cab lamp is on while the own elevator has the cab call.
    pub fn update(&mut self, wv: &WorldView) -> io::Result<()> {
        let num_floors = self.hall.len() as u8;
        for (call, req) in wv.requests() {
            if call.floor >= num_floors || !has_button(call, num_floors) {
                continue;
            }
            let on = req.status == RequestStatus::Confirmed;
            let lamp = &mut self.hall[call.floor as usize][call.dirn.idx()];
            if *lamp != Some(on) {
                self.io.hall_light(call, on)?;
                *lamp = Some(on);
            }
        }

        let Some(own) = wv.self_container() else { return Ok(()) };
        for (floor, lamp) in self.cab.iter_mut().enumerate() {
            let on = own.cab_requests.get(floor).copied().unwrap_or(false);
            if *lamp != Some(on) {
                self.io.cab_light(floor as u8, on)?;
                *lamp = Some(on);
            }
        }
        Ok(())
    }
}

/// Keeps the button lamps in line with the published worldview.
///
/// Runs until the worldview sender is dropped. A hardware error ends the task.
pub async fn run_lights<E: ElevatorIo>(io: E, num_floors: u8, mut wv_rx: watch::Receiver<WorldView>) -> anyhow::Result<()> {
    let mut lights = Lights::new(io, num_floors);
    loop {
        let wv = wv_rx.borrow_and_update().clone();
        lights.update(&wv)?;
        if wv_rx.changed().await.is_err() {
            return Ok(());
        }
    }
}
