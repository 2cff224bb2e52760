//! TCP driver for the elevator server (hardware or simulator).
//!
//! Every command is a fixed 4-byte frame; reads answer with a 4-byte frame as well.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::config;
use crate::print;

/// Elevator server button codes, see [crate::elevio::CallType]
pub const HALL_UP: u8 = 0;
#[allow(missing_docs)]
pub const HALL_DOWN: u8 = 1;
#[allow(missing_docs)]
pub const CAB: u8 = 2;

/// Motor codes understood by the elevator server
pub const DIRN_DOWN: u8 = u8::MAX;
#[allow(missing_docs)]
pub const DIRN_STOP: u8 = 0;
#[allow(missing_docs)]
pub const DIRN_UP: u8 = 1;

/// Handle to one elevator server connection. Cheap to clone; clones share the socket.
#[derive(Clone, Debug)]
pub struct Elevator {
    socket: Arc<Mutex<TcpStream>>,
    /// Number of floors the driver polls
    pub num_floors: u8,
}

impl Elevator {
    /// Connects to the elevator server at `addr`.
    ///
    /// Retries [config::HW_CONNECT_RETRIES] times, doubling the delay from
    /// [config::HW_RETRY_DELAY] between attempts, before the last error is returned.
    pub fn init(addr: &str, num_floors: u8) -> io::Result<Elevator> {
        let mut delay = config::HW_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Self {
                        socket: Arc::new(Mutex::new(stream)),
                        num_floors,
                    });
                }
                Err(e) if attempt < config::HW_CONNECT_RETRIES => {
                    print::warn(format!(
                        "Elevator server at {} not reachable ({}), retry {}/{} in {:?}",
                        addr, e, attempt, config::HW_CONNECT_RETRIES, delay
                    ));
                    thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn sock(&self) -> io::Result<MutexGuard<'_, TcpStream>> {
        self.socket.lock().map_err(|_| io::Error::new(io::ErrorKind::Other, "elevator socket mutex poisoned"))
    }

    fn write_cmd(&self, buf: [u8; 4]) -> io::Result<()> {
        self.sock()?.write_all(&buf)
    }

    fn query(&self, mut buf: [u8; 4]) -> io::Result<[u8; 4]> {
        let mut sock = self.sock()?;
        sock.write_all(&buf)?;
        sock.read_exact(&mut buf)?;
        Ok(buf)
    }

    #[allow(missing_docs)]
    pub fn motor_direction(&self, dirn: u8) -> io::Result<()> {
        self.write_cmd([1, dirn, 0, 0])
    }

    #[allow(missing_docs)]
    pub fn call_button_light(&self, floor: u8, call: u8, on: bool) -> io::Result<()> {
        self.write_cmd([2, call, floor, on as u8])
    }

    #[allow(missing_docs)]
    pub fn floor_indicator(&self, floor: u8) -> io::Result<()> {
        self.write_cmd([3, floor, 0, 0])
    }

    #[allow(missing_docs)]
    pub fn door_light(&self, on: bool) -> io::Result<()> {
        self.write_cmd([4, on as u8, 0, 0])
    }

    #[allow(missing_docs)]
    pub fn stop_button_light(&self, on: bool) -> io::Result<()> {
        self.write_cmd([5, on as u8, 0, 0])
    }

    #[allow(missing_docs)]
    pub fn call_button(&self, floor: u8, call: u8) -> io::Result<bool> {
        Ok(self.query([6, call, floor, 0])?[1] != 0)
    }

    /// `None` while between floors
    pub fn floor_sensor(&self) -> io::Result<Option<u8>> {
        let buf = self.query([7, 0, 0, 0])?;
        Ok(if buf[1] != 0 { Some(buf[2]) } else { None })
    }

    #[allow(missing_docs)]
    pub fn stop_button(&self) -> io::Result<bool> {
        Ok(self.query([8, 0, 0, 0])?[1] != 0)
    }

    #[allow(missing_docs)]
    pub fn obstruction(&self) -> io::Result<bool> {
        Ok(self.query([9, 0, 0, 0])?[1] != 0)
    }
}

impl fmt::Display for Elevator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.sock().ok().and_then(|s| s.peer_addr().ok());
        match addr {
            Some(addr) => write!(f, "Elevator@{}({})", addr, self.num_floors),
            None => write!(f, "Elevator@?({})", self.num_floors),
        }
    }
}
