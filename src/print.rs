//! ## Printing Module
//!
//! This module is only here to make logging in the terminal easier to read.
//! It prints in appropriate colors depending on the situation, and provides a
//! table print-format for the [WorldView].
//!
//! Every level can be switched off at start-up, see [crate::init::parse_args].
use std::sync::Mutex;

use ansi_term::Colour::{self, Green, Red, Yellow, Purple};
use once_cell::sync::Lazy;
use prettytable::{format, Attr, Cell, Row, Table, color};
use unicode_width::UnicodeWidthStr;

use crate::config;
use crate::world_view::{Dirn, ElevatorBehaviour, WorldView};
use crate::world_view::hall_request::{HallRequest, RequestStatus};

fn enabled(flag: &Lazy<Mutex<bool>>) -> bool {
    flag.lock().map(|on| *on).unwrap_or(true)
}

/// Prints an error message in red to the terminal.
///
/// If `PRINT_ERR_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[ERROR\]:   {}", msg
///
/// ## Example
/// ```
/// use elevator_sync::print;
///
/// print::err("Something went wrong!".to_string());
/// ```
pub fn err(msg: String) {
    if enabled(&config::PRINT_ERR_ON) {
        println!("{}{}\n", Red.paint("[ERROR]:   "), Red.paint(msg));
    }
}

/// Prints a warning message in yellow to the terminal.
///
/// If `PRINT_WARN_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[WARNING\]: {}", msg
pub fn warn(msg: String) {
    if enabled(&config::PRINT_WARN_ON) {
        println!("{}{}\n", Yellow.paint("[WARNING]: "), Yellow.paint(msg));
    }
}

/// Prints a success message in green to the terminal.
///
/// If `PRINT_OK_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[OK\]:      {}", msg
pub fn ok(msg: String) {
    if enabled(&config::PRINT_OK_ON) {
        println!("{}{}\n", Green.paint("[OK]:      "), Green.paint(msg));
    }
}

/// Prints an informational message in light blue to the terminal.
///
/// If `PRINT_INFO_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[INFO\]:    {}", msg
pub fn info(msg: String) {
    let light_blue = Colour::RGB(102, 178, 255);
    if enabled(&config::PRINT_INFO_ON) {
        println!("{}{}\n", light_blue.paint("[INFO]:    "), light_blue.paint(msg));
    }
}

/// Prints an error for something that should be impossible, in a rainbow of colors.
///
/// Used where a state is observed that the rest of the code rules out
/// (a floor outside the shaft, a missing own container, an unknown button code).
/// Always printed, also when `PRINT_ERR_ON` is `false`.
///
/// ## Terminal output
/// - "[ERROR]: Cosmic rays flipped a bit! IN: {fun}"
pub fn cosmic_err(fun: String) {
    print!("{}", Colour::Red.paint("[ERROR]: "));

    let colors = [
        Colour::Red,
        Colour::Yellow,
        Colour::Green,
        Colour::Cyan,
        Colour::Blue,
        Colour::Purple,
    ];

    let message = format!("Cosmic rays flipped a bit! IN: {}", fun);
    for (i, c) in message.chars().enumerate() {
        let color = colors[i % colors.len()];
        print!("{}", color.paint(c.to_string()));
    }

    println!();
}

/// Pads the input text to a fixed display width using spaces.
///
/// Accounts for characters that take more than one column (arrows, circles),
/// so the table columns stay aligned.
fn pad_text(text: &str, width: usize) -> String {
    let visible_width = UnicodeWidthStr::width(text);
    let padding = width.saturating_sub(visible_width);
    format!("{}{}", text, " ".repeat(padding))
}

/// One ledger cell, e.g. `● C v3 {1,2}`
fn request_label(req: &HallRequest) -> String {
    let (symbol, status) = match req.status {
        RequestStatus::Absent => ("○", "-"),
        RequestStatus::Unconfirmed => ("◐", "U"),
        RequestStatus::Confirmed => ("●", "C"),
        RequestStatus::Completed => ("✓", "D"),
    };
    let aware = req.aware.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
    let text = pad_text(&format!("{} {} v{} {{{}}}", symbol, status, req.version, aware), 18);
    match req.status {
        RequestStatus::Absent => text,
        RequestStatus::Unconfirmed => Yellow.paint(text).to_string(),
        RequestStatus::Confirmed => Green.paint(text).to_string(),
        RequestStatus::Completed => Purple.paint(text).to_string(),
    }
}

fn floors_label(flags: impl Iterator<Item = (usize, bool)>) -> String {
    let on: Vec<String> = flags.filter(|(_, on)| *on).map(|(f, _)| f.to_string()).collect();
    if on.is_empty() { "-".to_string() } else { on.join(",") }
}

/// Logs the current `WorldView` to the terminal as two tables.
///
/// - The hall-request ledger: one row per floor, status, version and awareness set of both calls.
/// - The fleet: one row per known elevator with position, behaviour, faults, cab calls and
///   assigned hall calls. Disconnected elevators are shown greyed out.
///
/// Does nothing unless `config::PRINT_WV_ON` is set.
pub fn worldview(worldview: &WorldView) {
    if !enabled(&config::PRINT_WV_ON) {
        return;
    }

    println!("{}", Purple.bold().paint(format!("WORLD VIEW OF NODE {}", worldview.self_id)));

    let mut ledger = Table::new();
    ledger.set_format(*format::consts::FORMAT_BOX_CHARS);
    ledger.set_titles(Row::new(vec![
        Cell::new("Floor").with_style(Attr::ForegroundColor(color::BRIGHT_BLUE)),
        Cell::new("Up").with_style(Attr::ForegroundColor(color::BRIGHT_BLUE)),
        Cell::new("Down").with_style(Attr::ForegroundColor(color::BRIGHT_BLUE)),
    ]));
    for (floor, row) in worldview.hall_requests.iter().enumerate().rev() {
        ledger.add_row(Row::new(vec![
            Cell::new(&floor.to_string()),
            Cell::new(&request_label(&row[0])),
            Cell::new(&request_label(&row[1])),
        ]));
    }
    ledger.printstd();

    let mut fleet = Table::new();
    fleet.set_format(*format::consts::FORMAT_BOX_CHARS);
    fleet.set_titles(Row::new(
        ["ID", "Alive", "Floor", "State", "Faults", "Cab", "Tasks (up/down)", "Version"]
            .iter()
            .map(|t| Cell::new(t).with_style(Attr::ForegroundColor(color::BRIGHT_BLUE)))
            .collect(),
    ));

    for (id, elev) in &worldview.elevator_containers {
        let alive = worldview.is_alive(*id);
        let alive_text = if alive { Green.paint("yes") } else { Red.paint("no") }.to_string();

        let state = match (elev.dirn, elev.behaviour) {
            (_, ElevatorBehaviour::Idle) => Green.paint("Idle").to_string(),
            (Dirn::Up, ElevatorBehaviour::Moving) => Yellow.paint(pad_text("⬆ Moving", 10)).to_string(),
            (Dirn::Down, ElevatorBehaviour::Moving) => Yellow.paint(pad_text("⬇ Moving", 10)).to_string(),
            (Dirn::Stop, ElevatorBehaviour::Moving) => Red.paint("Not moving").to_string(),
            (_, ElevatorBehaviour::DoorOpen) => Purple.paint("Door open").to_string(),
        };

        let mut faults = Vec::new();
        if elev.obstruction { faults.push("obstr"); }
        if elev.door_stuck { faults.push("door"); }
        if elev.motor_stuck { faults.push("motor"); }
        let faults_text = if faults.is_empty() {
            Green.paint("-").to_string()
        } else {
            Red.paint(faults.join(",")).to_string()
        };

        let floor_text = elev.floor.map_or("?".to_string(), |f| f.to_string());
        let cab_text = floors_label(elev.cab_requests.iter().copied().enumerate());
        let tasks_text = format!(
            "{} / {}",
            floors_label(elev.tasks.iter().map(|t| t[0]).enumerate()),
            floors_label(elev.tasks.iter().map(|t| t[1]).enumerate()),
        );

        let mut row = Row::new(vec![
            Cell::new(&id.to_string()),
            Cell::new(&alive_text),
            Cell::new(&floor_text),
            Cell::new(&state),
            Cell::new(&faults_text),
            Cell::new(&cab_text),
            Cell::new(&tasks_text),
            Cell::new(&elev.version.to_string()),
        ]);
        if !alive {
            for cell in row.iter_mut() {
                cell.style(Attr::Dim);
            }
        }
        fleet.add_row(row);
    }
    fleet.printstd();
}
