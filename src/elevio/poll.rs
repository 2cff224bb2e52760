//! Polling threads for the elevator server.
//!
//! Each signal is polled on its own OS thread with a fixed period and only changes are
//! reported. All threads feed one `crossbeam` channel; [`bridge`] moves the events into tokio.

use crossbeam_channel as cbc;
use std::io;
use std::thread;
use std::time;
use tokio::sync::mpsc;

use super::elev::{self, Elevator};
use super::{CallButton, HardwareEvent};
use crate::print;


/// Starts one polling thread per signal.
///
/// ## Returns
/// - The receiving end all threads report to. A thread that loses the connection reports
///   [`HardwareEvent::Fault`] once and stops.
pub fn spawn_pollers(elev: &Elevator, period: time::Duration) -> cbc::Receiver<HardwareEvent> {
    let (tx, rx) = cbc::unbounded::<HardwareEvent>();

    let pollers: [(&str, fn(&Elevator, &cbc::Sender<HardwareEvent>, time::Duration) -> io::Result<()>); 4] = [
        ("call_buttons", call_buttons),
        ("floor_sensor", floor_sensor),
        ("stop_button", stop_button),
        ("obstruction", obstruction),
    ];

    for (name, poller) in pollers {
        let elev = elev.clone();
        let thread_tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("poll_{}", name))
            .spawn(move || {
                if let Err(e) = poller(&elev, &thread_tx, period) {
                    report_fault(&thread_tx, name, e);
                }
            });
        if let Err(e) = spawned {
            report_fault(&tx, name, e);
        }
    }
    rx
}

/// Forwards events from the polling threads into a tokio channel.
///
/// Runs on a blocking thread until either side is closed.
pub fn bridge(rx: cbc::Receiver<HardwareEvent>, tx: mpsc::Sender<HardwareEvent>) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Ok(event) = rx.recv() {
            if tx.blocking_send(event).is_err() {
                break;
            }
        }
        print::warn("Hardware event bridge stopped".to_string());
    })
}

fn report_fault(ch: &cbc::Sender<HardwareEvent>, name: &str, e: io::Error) {
    print::err(format!("Polling {} failed: {}", name, e));
    if send(ch, HardwareEvent::Fault(e)).is_err() {
        print::warn(format!("Nobody is listening for the {} fault", name));
    }
}

fn send(ch: &cbc::Sender<HardwareEvent>, event: HardwareEvent) -> io::Result<()> {
    ch.send(event).map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "hardware event receiver dropped"))
}

fn call_buttons(elev: &Elevator, ch: &cbc::Sender<HardwareEvent>, period: time::Duration) -> io::Result<()> {
    let mut prev = vec![[false; 3]; elev.num_floors.into()];
    loop {
        for f in 0..elev.num_floors {
            for c in [elev::HALL_UP, elev::HALL_DOWN, elev::CAB] {
                let v = elev.call_button(f, c)?;
                if v && !prev[f as usize][c as usize] {
                    if let Some(button) = CallButton::from_raw(f, c) {
                        send(ch, HardwareEvent::Button(button))?;
                    }
                }
                prev[f as usize][c as usize] = v;
            }
        }
        thread::sleep(period)
    }
}

fn floor_sensor(elev: &Elevator, ch: &cbc::Sender<HardwareEvent>, period: time::Duration) -> io::Result<()> {
    let mut prev = None;
    loop {
        let f = elev.floor_sensor()?;
        if let Some(floor) = f.filter(|_| f != prev) {
            send(ch, HardwareEvent::Floor(floor))?;
        }
        prev = f;
        thread::sleep(period)
    }
}

fn stop_button(elev: &Elevator, ch: &cbc::Sender<HardwareEvent>, period: time::Duration) -> io::Result<()> {
    let mut prev = false;
    loop {
        let v = elev.stop_button()?;
        if prev != v {
            send(ch, HardwareEvent::Stop(v))?;
            prev = v;
        }
        thread::sleep(period)
    }
}

fn obstruction(elev: &Elevator, ch: &cbc::Sender<HardwareEvent>, period: time::Duration) -> io::Result<()> {
    let mut prev = false;
    loop {
        let v = elev.obstruction()?;
        if prev != v {
            send(ch, HardwareEvent::Obstruction(v))?;
            prev = v;
        }
        thread::sleep(period)
    }
}
