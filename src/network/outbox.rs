//! At-least-once delivery over an unreliable broadcast.
//!
//! An [`Outbox`] holds messages keyed by what they are about. Each entry has a deadline; when
//! it passes, the entry is handed out again by [`Outbox::due`] until it is acknowledged
//! ([`Outbox::ack`], [`Outbox::retain`]) or has been sent `max_attempts` times.
//!
//! The outbox does not send anything itself and knows nothing about message contents.

use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};

use crate::print;

#[derive(Debug, Clone)]
struct Entry<M> {
    msg: M,
    deadline: Instant,
    attempts: u32,
}

/// Pending messages waiting for acknowledgement
#[derive(Debug, Clone)]
pub struct Outbox<K, M> {
    entries: BTreeMap<K, Entry<M>>,
    retransmit: Duration,
    max_attempts: u32,
}

impl<K: Ord + Clone + std::fmt::Debug, M: Clone> Outbox<K, M> {
    /// Creates an empty outbox resending every `retransmit`, at most `max_attempts` times.
    pub fn new(retransmit: Duration, max_attempts: u32) -> Self {
        Self { entries: BTreeMap::new(), retransmit, max_attempts }
    }

    /// Queues `msg` under `key`, replacing any older message with the same key.
    ///
    /// The caller is expected to have sent it once already; the first retransmission is
    /// due after one period.
    pub fn push(&mut self, key: K, msg: M) {
        let deadline = Instant::now() + self.retransmit;
        self.entries.insert(key, Entry { msg, deadline, attempts: 0 });
    }

    /// Removes the entry for `key`.
    pub fn ack(&mut self, key: &K) -> Option<M> {
        self.entries.remove(key).map(|e| e.msg)
    }

    /// Keeps only entries for which `pending` is true; the rest count as acknowledged.
    pub fn retain(&mut self, mut pending: impl FnMut(&K, &M) -> bool) {
        self.entries.retain(|k, e| pending(k, &e.msg));
    }

    /// Entries whose deadline has passed. Their deadline is pushed one period ahead.
    ///
    /// Entries that have reached `max_attempts` are dropped instead.
    pub fn due(&mut self) -> Vec<(K, M)> {
        let now = Instant::now();
        let retransmit = self.retransmit;
        let max_attempts = self.max_attempts;
        let mut out = Vec::new();

        self.entries.retain(|key, entry| {
            if entry.deadline > now {
                return true;
            }
            if entry.attempts >= max_attempts {
                print::warn(format!("Giving up retransmitting {:?} after {} attempts", key, entry.attempts));
                return false;
            }
            entry.attempts += 1;
            entry.deadline = now + retransmit;
            out.push((key.clone(), entry.msg.clone()));
            true
        });
        out
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
