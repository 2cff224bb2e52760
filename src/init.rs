//! Start-up of a node: command line arguments and derived settings.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::config::{self, Config};
use crate::ip_help_functions;
use crate::manager::AssignerBackend;
use crate::print;
use crate::world_view::NodeId;


const HELP: &str = "Available arguments:
  id::<n>                node id (default: last octet of the local IP)
  floors::<n>            number of floors
  elev_addr::<host:port> address of the elevator server
  port::<n>              UDP broadcast port of the fleet
  assigner::<path>       external hall_request_assigner executable
  door_open::<ms>        door open duration
  heartbeat::<ms>        heartbeat period
  timeout::<ms>          disconnect timeout
  print_wv::true/false
  print_err::true/false
  print_warn::true/false
  print_ok::true/false
  print_info::true/false
  debug                  only error messages are shown
  help";

fn set_flag(flag: &config::PrintFlag, on: bool) {
    if let Ok(mut value) = flag.lock() {
        *value = on;
    }
}

fn parse_ms(key: &str, value: &str) -> anyhow::Result<Duration> {
    let ms: u64 = value.parse().with_context(|| format!("{} expects milliseconds, got {:?}", key, value))?;
    Ok(Duration::from_millis(ms))
}

/// Reads `key::value` arguments into a [Config].
///
/// Print switches are applied right away. Unknown arguments are warned about and ignored.
///
/// ## Returns
/// - `Ok(None)` if `help` was asked for.
/// - `Err` for values that do not parse, or settings no fleet can run with.
///
/// ## Example
/// ```
/// use elevator_sync::init::parse_arg_list;
///
/// let cfg = parse_arg_list(["id::3", "floors::6"].map(String::from)).unwrap().unwrap();
/// assert_eq!(cfg.node_id, Some(3));
/// assert_eq!(cfg.num_floors, 6);
/// ```
pub fn parse_arg_list<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Option<Config>> {
    let mut cfg = Config::default();

    for arg in args {
        let lower = arg.to_lowercase();
        if lower == "help" {
            return Ok(None);
        }
        if lower == "debug" {
            set_flag(&config::PRINT_WV_ON, false);
            set_flag(&config::PRINT_WARN_ON, false);
            set_flag(&config::PRINT_OK_ON, false);
            set_flag(&config::PRINT_INFO_ON, false);
            continue;
        }

        let Some((key, value)) = arg.split_once("::") else {
            print::warn(format!("Ignoring argument {:?}", arg));
            continue;
        };
        let key = key.to_lowercase();
        let is_true = value.eq_ignore_ascii_case("true");

        match key.as_str() {
            "id" => cfg.node_id = Some(value.parse().with_context(|| format!("invalid id {:?}", value))?),
            "floors" => cfg.num_floors = value.parse().with_context(|| format!("invalid floor count {:?}", value))?,
            "elev_addr" => cfg.elev_addr = value.to_string(),
            "port" => cfg.port = value.parse().with_context(|| format!("invalid port {:?}", value))?,
            "assigner" => cfg.assigner = Some(PathBuf::from(value)),
            "door_open" => cfg.door_open = parse_ms(&key, value)?,
            "heartbeat" => cfg.heartbeat = parse_ms(&key, value)?,
            "timeout" => cfg.disconnect_timeout = parse_ms(&key, value)?,
            "print_wv" => set_flag(&config::PRINT_WV_ON, is_true),
            "print_err" => set_flag(&config::PRINT_ERR_ON, is_true),
            "print_warn" => set_flag(&config::PRINT_WARN_ON, is_true),
            "print_ok" => set_flag(&config::PRINT_OK_ON, is_true),
            "print_info" => set_flag(&config::PRINT_INFO_ON, is_true),
            _ => print::warn(format!("Ignoring unknown argument {:?}", arg)),
        }
    }

    if cfg.num_floors < 2 {
        bail!("a fleet needs at least 2 floors, got {}", cfg.num_floors);
    }
    if cfg.node_id == Some(config::ERROR_ID) {
        bail!("id {} is reserved", config::ERROR_ID);
    }
    if cfg.disconnect_timeout <= cfg.heartbeat {
        bail!("disconnect timeout {:?} must be longer than the heartbeat {:?}", cfg.disconnect_timeout, cfg.heartbeat);
    }
    Ok(Some(cfg))
}

/// Reads the process arguments. Prints the help text and exits on `help`.
pub fn parse_args() -> anyhow::Result<Config> {
    match parse_arg_list(env::args().skip(1))? {
        Some(cfg) => Ok(cfg),
        None => {
            println!("{}", HELP);
            std::process::exit(0);
        }
    }
}

/// The id of this node: the one given on the command line, or one derived from the local IP.
pub fn node_id(cfg: &Config) -> anyhow::Result<NodeId> {
    match cfg.node_id {
        Some(id) => Ok(id),
        None => ip_help_functions::id_from_local_ip(),
    }
}

/// The assigner the node should use.
pub fn assigner_backend(cfg: &Config) -> AssignerBackend {
    match &cfg.assigner {
        Some(path) => AssignerBackend::External(path.clone()),
        None => AssignerBackend::Native,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Option<Config>> {
        parse_arg_list(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn no_arguments_give_the_defaults() {
        assert_eq!(parse(&[]).unwrap(), Some(Config::default()));
    }

    #[test]
    fn reads_every_setting() {
        let cfg = parse(&[
            "id::7", "floors::6", "elev_addr::10.0.0.2:15657", "port::4000",
            "assigner::./hall_request_assigner", "door_open::1000", "heartbeat::50", "timeout::600",
        ]).unwrap().unwrap();

        assert_eq!(cfg.node_id, Some(7));
        assert_eq!(cfg.num_floors, 6);
        assert_eq!(cfg.elev_addr, "10.0.0.2:15657");
        assert_eq!(cfg.port, 4000);
        assert_eq!(assigner_backend(&cfg), AssignerBackend::External(PathBuf::from("./hall_request_assigner")));
        assert_eq!(cfg.door_open, Duration::from_secs(1));
        assert_eq!(cfg.heartbeat, Duration::from_millis(50));
        assert_eq!(cfg.disconnect_timeout, Duration::from_millis(600));
        assert_eq!(node_id(&cfg).unwrap(), 7);
    }

    #[test]
    fn help_stops_parsing() {
        assert_eq!(parse(&["floors::6", "HELP"]).unwrap(), None);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(parse(&["id::abc"]).is_err());
        assert!(parse(&["id::255"]).is_err());
        assert!(parse(&["floors::1"]).is_err());
        assert!(parse(&["door_open::soon"]).is_err());
        assert!(parse(&["heartbeat::2000", "timeout::1000"]).is_err());
    }

    #[test]
    fn unknown_arguments_are_ignored() {
        assert_eq!(parse(&["colour::blue", "stray"]).unwrap(), Some(Config::default()));
    }
}
