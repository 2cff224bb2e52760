//! Serialization and deserialization of the ledger broadcast ([LedgerMessage])
//!
//! A datagram is the ASCII network key ([config::KEY_STR]) followed by the `bincode`
//! encoding of a [LedgerMessage]. Every message is self-contained: it carries the whole
//! hall-request table and every elevator snapshot the sender knows.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::config;
use crate::world_view::{WorldView, ElevatorContainer, NodeId};
use crate::world_view::hall_request::HallRequest;


/// The message every node broadcasts on each heartbeat and on every completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMessage {
    /// [config::PROTOCOL_VERSION] of the sender
    pub protocol_version: u8,

    /// The node that sent this message
    pub origin: NodeId,

    /// Per-origin sequence number, increasing with every message sent
    pub seq: u64,

    /// Number of floors the sender was configured with
    pub num_floors: u8,

    /// The sender's hall-request ledger, indexed `[floor][HallDirn]`
    pub hall_requests: Vec<[HallRequest; 2]>,

    /// Snapshots known by the sender. The sender's own snapshot comes first.
    pub elevators: Vec<ElevatorContainer>,
}

impl LedgerMessage {
    /// Builds the message describing `wv`, stamped with `seq`.
    pub fn from_worldview(wv: &WorldView, seq: u64) -> Self {
        let own = wv.elevator_containers.get(&wv.self_id).cloned();
        let others = wv.elevator_containers.iter()
            .filter(|(id, _)| **id != wv.self_id)
            .map(|(_, elev)| elev.clone());

        Self {
            protocol_version: config::PROTOCOL_VERSION,
            origin: wv.self_id,
            seq,
            num_floors: wv.num_floors,
            hall_requests: wv.hall_requests.clone(),
            elevators: own.into_iter().chain(others).collect(),
        }
    }
}


/// Reasons a received datagram is not accepted as a [LedgerMessage].
#[derive(Debug, Error)]
pub enum WireError {
    /// Datagram does not start with [config::KEY_STR]. Most likely foreign traffic on the port.
    #[error("datagram does not carry the network key")]
    WrongKey,

    /// Sender speaks another version of the protocol
    #[error("unsupported protocol version {0} (expected {})", config::PROTOCOL_VERSION)]
    Version(u8),

    /// The body could not be decoded
    #[error("malformed ledger message: {0}")]
    Malformed(#[from] bincode::Error),
}


/// Serializes a [LedgerMessage] into a datagram.
///
/// ## Parameters
/// - `msg`: The message to encode.
///
/// ## Returns
/// - The key-prefixed bytes, or the `bincode` error.
pub fn encode(msg: &LedgerMessage) -> Result<Vec<u8>, WireError> {
    let body = bincode::serialize(msg)?;
    let mut out = Vec::with_capacity(config::KEY_STR.len() + body.len());
    out.extend_from_slice(config::KEY_STR.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserializes a datagram into a [LedgerMessage].
///
/// ## Parameters
/// - `data`: The raw datagram, including the network key.
///
/// ## Returns
/// - The message, or why it was rejected.
pub fn decode(data: &[u8]) -> Result<LedgerMessage, WireError> {
    let body = data.strip_prefix(config::KEY_STR.as_bytes()).ok_or(WireError::WrongKey)?;
    let msg: LedgerMessage = bincode::deserialize(body)?;
    if msg.protocol_version != config::PROTOCOL_VERSION {
        return Err(WireError::Version(msg.protocol_version));
    }
    Ok(msg)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_view::{HallCall, HallDirn};

    fn sample() -> LedgerMessage {
        let mut wv = WorldView::new(2, 4);
        wv.elevator_containers.insert(1, ElevatorContainer::new(1, 4));
        wv.elevator_containers.insert(3, ElevatorContainer::new(3, 4));
        if let Some(r) = wv.request_mut(HallCall::new(2, HallDirn::Up)) {
            r.observe(2);
        }
        LedgerMessage::from_worldview(&wv, 9)
    }

    #[test]
    fn own_snapshot_is_sent_first() {
        let msg = sample();
        let ids: Vec<_> = msg.elevators.iter().map(|e| e.elevator_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(msg.origin, 2);
        assert_eq!(msg.seq, 9);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let msg = sample();
        let bytes = encode(&msg).unwrap();
        assert!(bytes.starts_with(config::KEY_STR.as_bytes()));
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn rejects_foreign_datagrams() {
        assert!(matches!(decode(b"hello there"), Err(WireError::WrongKey)));
        assert!(matches!(decode(b""), Err(WireError::WrongKey)));
    }

    #[test]
    fn rejects_truncated_body() {
        let bytes = encode(&sample()).unwrap();
        let cut = &bytes[..config::KEY_STR.len() + 5];
        assert!(matches!(decode(cut), Err(WireError::Malformed(_))));
    }

    #[test]
    fn rejects_other_protocol_versions() {
        let mut msg = sample();
        msg.protocol_version = config::PROTOCOL_VERSION + 1;
        let bytes = encode(&msg).unwrap();
        assert!(matches!(decode(&bytes), Err(WireError::Version(v)) if v == config::PROTOCOL_VERSION + 1));
    }
}
