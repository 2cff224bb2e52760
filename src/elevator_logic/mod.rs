//! ## Local elevator
//!
//! Runs the car this node is connected to.
//!
//! The task reacts to hardware events, to the hall calls the assigner gives this node and to
//! cab calls recovered from the fleet. It reports back to the synchronizer with [LocalEvent]s:
//! hall buttons (which go through the ledger before anything moves), served hall calls and
//! changes to the published elevator state.
//!
//! Cab buttons never leave this task as requests; they are served directly and only published
//! as part of the state.

pub mod fsm;
pub mod request;
pub mod timer;
pub mod lights;

use anyhow::{bail, Context};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration};

use crate::config;
use crate::elevio::{CallButton, ElevatorIo, HardwareEvent};
use crate::print;
use crate::world_view::{ElevatorContainer, HallCall, NodeId};

use fsm::ElevatorFsm;


/// What the local elevator tells the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    /// A hall button was pressed on this node's panel
    HallButton(HallCall),
    /// This elevator served the hall call
    HallServed(HallCall),
    /// The published elevator state changed
    State(ElevatorContainer),
}

/// Channels of the local elevator task.
pub struct LocalElevatorChannels {
    /// Events from the polling threads
    pub hw_rx: mpsc::Receiver<HardwareEvent>,
    /// Hall calls assigned to this node, `[floor][HallDirn]`
    pub tasks_rx: watch::Receiver<Vec<[bool; 2]>>,
    /// Cab calls recovered from the fleet after a restart
    pub cab_restore_rx: mpsc::Receiver<Vec<bool>>,
    /// Reports to the synchronizer
    pub local_tx: mpsc::Sender<LocalEvent>,
}

/// Runs the local elevator.
///
/// ## Parameters
/// - `io`: The hardware.
/// - `self_id`, `num_floors`, `door_open`: From the node config.
/// - `chs`: See [LocalElevatorChannels].
///
/// ## Returns
/// - `Err` when the hardware fails. Nothing can be done locally without it.
/// - `Ok` when the synchronizer is gone.
pub async fn run_local_elevator<E: ElevatorIo>(
    io: E,
    self_id: NodeId,
    num_floors: u8,
    door_open: Duration,
    mut chs: LocalElevatorChannels,
) -> anyhow::Result<()> {
    let mut fsm = ElevatorFsm::new(io, self_id, num_floors, door_open);
    fsm.on_init().context("failed to initialize the elevator")?;

    let mut published = fsm.elevator.clone();
    if chs.local_tx.send(LocalEvent::State(published.clone())).await.is_err() {
        return Ok(());
    }

    let mut tick = time::interval(config::POLL_PERIOD);
    tick.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        let served = tokio::select! {
            event = chs.hw_rx.recv() => match event {
                Some(HardwareEvent::Button(CallButton::Hall(call))) => {
                    if chs.local_tx.send(LocalEvent::HallButton(call)).await.is_err() {
                        return Ok(());
                    }
                    Vec::new()
                }
                Some(HardwareEvent::Button(CallButton::Cab(floor))) => fsm.on_cab_button(floor)?,
                Some(HardwareEvent::Floor(floor)) => fsm.on_floor_arrival(floor)?,
                Some(HardwareEvent::Obstruction(obstructed)) => {
                    fsm.on_obstruction(obstructed);
                    Vec::new()
                }
                Some(HardwareEvent::Stop(pressed)) => {
                    fsm.on_stop_button(pressed)?;
                    Vec::new()
                }
                Some(HardwareEvent::Fault(e)) => {
                    return Err(anyhow::Error::new(e).context("lost the connection to the elevator server"));
                }
                None => bail!("hardware event channel closed"),
            },
            changed = chs.tasks_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let tasks = chs.tasks_rx.borrow_and_update().clone();
                fsm.on_tasks_updated(&tasks)?
            }
            Some(cabs) = chs.cab_restore_rx.recv() => {
                print::info(format!("Restoring cab calls {:?}", cabs));
                fsm.on_cab_restore(&cabs)?
            }
            _ = tick.tick() => fsm.check_timers()?,
        };

        for call in served {
            if chs.local_tx.send(LocalEvent::HallServed(call)).await.is_err() {
                return Ok(());
            }
        }

        if fsm.elevator != published {
            published = fsm.elevator.clone();
            if chs.local_tx.send(LocalEvent::State(published.clone())).await.is_err() {
                return Ok(());
            }
        }
    }
}
