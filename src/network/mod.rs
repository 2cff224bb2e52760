//! ## Network module
//!
//! Everything a node needs to talk to its peers. All peers are equal; there is no master.
//!
//! ## Sub-modules
//! - [udp_broadcast]: sockets, sending and receiving ledger datagrams.
//! - [peers]: presence of peers, derived from the datagrams.
//! - [outbox]: generic at-least-once retransmission used for completions.
//!
//! Delivery is unordered, lossy and may duplicate. Nothing in here tries to fix that;
//! the ledger merge is built to tolerate it.

pub mod udp_broadcast;
pub mod peers;
pub mod outbox;
