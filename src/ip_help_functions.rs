//! This module contains some help functions regarding the IP address
//!
//! Functions
//! - [ip2id]: Generates an ID for the node based on the IP-address.
//! - [id_from_local_ip]: Looks up the local address and derives the ID from it.

use std::net::IpAddr;

use anyhow::{anyhow, Context};
use local_ip_address::local_ip;

use crate::config;
use crate::world_view::NodeId;


/// Extracts your ID based on `ip`: the last octet of an IPv4 address.
///
/// ## Returns
/// - `None` for IPv6 addresses, and for addresses ending in [config::ERROR_ID].
///
/// ## Example
/// ```
/// use elevator_sync::ip_help_functions::ip2id;
/// use std::net::IpAddr;
/// use std::str::FromStr;
///
/// let ip = IpAddr::from_str("192.168.0.1").unwrap();
/// assert_eq!(ip2id(ip), Some(1));
///
/// let broadcast = IpAddr::from_str("10.0.0.255").unwrap();
/// assert_eq!(ip2id(broadcast), None);
/// ```
pub fn ip2id(ip: IpAddr) -> Option<NodeId> {
    match ip {
        IpAddr::V4(addr) => Some(addr.octets()[3]).filter(|id| *id != config::ERROR_ID),
        IpAddr::V6(_) => None,
    }
}

/// The ID of this machine, from its local IPv4 address.
///
/// Fails when the machine has no usable address; pass `id::<n>` on the command line then.
pub fn id_from_local_ip() -> anyhow::Result<NodeId> {
    let ip = local_ip().context("failed to find the local IP address")?;
    ip2id(ip).ok_or_else(|| anyhow!("cannot derive a node id from {}", ip))
}
