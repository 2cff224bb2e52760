//! ## Handles the UDP broadcast of the ledger
//!
//! One socket sends every outgoing datagram to the broadcast address, another listens on the
//! broadcast port. Both are configured with `socket2` (reuse address, broadcast) so several nodes
//! can run on one machine, and are then handed to tokio.
//!
//! Loss, duplication and reordering are expected and are never errors here; the merge rule
//! takes care of them. Only failing to set up a socket is.

use std::net::SocketAddr;

use anyhow::Context;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config;
use crate::print;
use crate::world_view::NodeId;
use crate::world_view::serial::{self, LedgerMessage, WireError};


/// Creates a non-blocking, address-reusing broadcast socket bound to `bind`.
fn broadcast_socket(bind: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.bind(&bind.into())?;
    UdpSocket::from_std(socket.into())
}

/// Starts and runs the UDP broadcaster.
///
/// ## Parameters
/// - `port`: The broadcast port of the fleet.
/// - `out_rx`: Encoded datagrams from the synchronizer.
///
/// ## Behavior
/// Sends every datagram received on `out_rx` to the broadcast address. Failed sends (e.g. the
/// cable is out) are logged and dropped; the next heartbeat carries the same state anyway.
///
/// ## Note
/// Runs until `out_rx` is closed, and should be called asynchronously.
pub async fn start_udp_broadcaster(port: u16, mut out_rx: mpsc::Receiver<Vec<u8>>) -> anyhow::Result<()> {
    let broadcast_addr: SocketAddr = format!("{}:{}", config::BC_ADDR, port).parse()
        .context("invalid broadcast address")?;
    let bind_addr: SocketAddr = format!("{}:0", config::BC_LISTEN_ADDR).parse()
        .context("invalid bind address")?;
    let socket = broadcast_socket(bind_addr).context("failed to set up broadcast socket")?;

    let mut failing = false;
    while let Some(datagram) = out_rx.recv().await {
        match socket.send_to(&datagram, &broadcast_addr).await {
            Ok(_) => {
                if failing {
                    print::ok("Broadcasting again".to_string());
                    failing = false;
                }
            }
            Err(e) => {
                if !failing {
                    print::warn(format!("Broadcast failed: {}", e));
                    failing = true;
                }
            }
        }
    }
    Ok(())
}

/// Starts and runs the UDP listener.
///
/// ## Parameters
/// - `port`: The broadcast port of the fleet.
/// - `self_id`: This node's id. Own messages looped back by the network are dropped.
/// - `udp_tx`: Decoded peer messages, to the synchronizer.
///
/// ## Behavior
/// - Datagrams without the network key are foreign traffic and ignored silently.
/// - Other undecodable datagrams are logged as warnings and ignored.
///
/// ## Note
/// Runs until `udp_tx` is closed, and should be called asynchronously.
pub async fn start_udp_listener(port: u16, self_id: NodeId, udp_tx: mpsc::Sender<LedgerMessage>) -> anyhow::Result<()> {
    let listen_addr: SocketAddr = format!("{}:{}", config::BC_LISTEN_ADDR, port).parse()
        .context("invalid listen address")?;
    let socket = broadcast_socket(listen_addr).context("failed to set up listen socket")?;
    let mut buf = vec![0u8; config::UDP_BUFFER];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                print::warn(format!("UDP receive failed: {}", e));
                continue;
            }
        };

        match serial::decode(&buf[..len]) {
            Ok(msg) if msg.origin == self_id => {}
            Ok(msg) => {
                if udp_tx.send(msg).await.is_err() {
                    return Ok(());
                }
            }
            Err(WireError::WrongKey) => {}
            Err(e) => print::warn(format!("Dropped datagram from {}: {}", from, e)),
        }
    }
}
