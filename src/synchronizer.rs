//! ## Synchronizer
//!
//! The single owner of this node's [WorldView]. Every change to the ledger, from the local
//! elevator or from a peer, goes through the event loop in [run_synchronizer], one event at a
//! time. Other tasks only see the worldview through a `watch` channel.
//!
//! [Synchronizer] holds the state and the event handlers. The handlers do no I/O and return
//! what has to be sent, so several nodes can be driven in-process.

use std::collections::BTreeMap;

use anyhow::bail;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration};

use crate::config;
use crate::elevator_logic::LocalEvent;
use crate::manager::Assigner;
use crate::network::outbox::Outbox;
use crate::network::peers::{PeerEvent, PeerWatchdog};
use crate::print;
use crate::world_view::{HallCall, NodeId, WorldView};
use crate::world_view::hall_request::{HallRequest, Lifecycle, RequestStatus};
use crate::world_view::serial::{self, LedgerMessage};
use crate::world_view::world_view_update::{
    advance_barriers,
    complete_hall_call,
    mark_connected,
    mark_disconnected,
    merge_message,
    observe_hall_call,
    reclaim_observations,
    sanitize_message,
    set_self_state,
    unaware_peers,
};


/// State of the event loop.
pub struct Synchronizer {
    wv: WorldView,
    seq: u64,
    watchdog: PeerWatchdog,
    completions: Outbox<HallCall, HallRequest>,
    /// Hall calls pressed on this node that are not served yet
    observed: BTreeMap<HallCall, Lifecycle>,
    assigner: Assigner,
}

impl Synchronizer {
    /// Creates a synchronizer for a node that knows only itself.
    pub fn new(self_id: NodeId, num_floors: u8, assigner: Assigner, disconnect_timeout: Duration) -> Self {
        Self {
            wv: WorldView::new(self_id, num_floors),
            seq: 0,
            watchdog: PeerWatchdog::new(self_id, disconnect_timeout),
            completions: Outbox::new(config::COMPLETION_RETRANSMIT, config::COMPLETION_MAX_ATTEMPTS),
            observed: BTreeMap::new(),
            assigner,
        }
    }

    #[allow(missing_docs)]
    pub fn world_view(&self) -> &WorldView {
        &self.wv
    }

    /// Completions still waiting for every live peer to see them
    pub fn pending_completions(&self) -> usize {
        self.completions.len()
    }

    /// Builds the next outgoing message.
    ///
    /// Bumps the own snapshot's version, so every message carries a snapshot peers will adopt.
    pub fn message(&mut self) -> LedgerMessage {
        self.seq += 1;
        if let Some(own) = self.wv.self_container_mut() {
            own.version += 1;
        }
        LedgerMessage::from_worldview(&self.wv, self.seq)
    }

    /// Handles a report from the local elevator.
    ///
    /// ## Returns
    /// - A message to broadcast right away, for new hall calls and completions.
    pub fn on_local_event(&mut self, event: LocalEvent) -> Option<LedgerMessage> {
        match event {
            LocalEvent::HallButton(call) => {
                let started = observe_hall_call(&mut self.wv, call);
                if let Some(lifecycle) = self.wv.request(call).and_then(HallRequest::lifecycle) {
                    self.observed.insert(call, lifecycle);
                }
                if !started {
                    return None;
                }
                // A new lifecycle supersedes any completion still being resent
                self.completions.ack(&call);
                print::info(format!("Hall call {:?} observed", call));
                self.advance();
                Some(self.message())
            }
            LocalEvent::HallServed(call) => {
                let record = complete_hall_call(&mut self.wv, call)?;
                print::ok(format!("Hall call {:?} served", call));
                self.completions.push(call, record);
                reclaim_observations(&mut self.wv, &mut self.observed);
                self.advance();
                Some(self.message())
            }
            LocalEvent::State(state) => {
                set_self_state(&mut self.wv, &state);
                None
            }
        }
    }

    /// Handles a message from a peer.
    ///
    /// ## Returns
    /// - Cab calls the fleet remembers for this node, right after a restart.
    pub fn on_peer_message(&mut self, mut msg: LedgerMessage) -> Option<Vec<bool>> {
        if msg.origin == self.wv.self_id {
            return None;
        }
        sanitize_message(&mut msg, self.wv.num_floors);

        if let Some(PeerEvent::Joined(id)) = self.watchdog.heard(msg.origin) {
            print::ok(format!("Node {} joined", id));
        }
        mark_connected(&mut self.wv, msg.origin);

        let outcome = merge_message(&mut self.wv, &msg);
        for call in reclaim_observations(&mut self.wv, &mut self.observed) {
            print::warn(format!("Hall call {:?} was overridden before it was served, observing it again", call));
            self.completions.ack(&call);
        }
        self.advance();
        outcome.recovered_cab_calls
    }

    /// Checks the peer watchdog.
    ///
    /// ## Returns
    /// - `true` if a peer was lost. Its calls should be reassigned right away.
    pub fn on_watchdog(&mut self) -> bool {
        let mut lost_any = false;
        for event in self.watchdog.check() {
            if let PeerEvent::Lost(id) = event {
                print::warn(format!("Node {} lost", id));
                lost_any |= mark_disconnected(&mut self.wv, id);
            }
        }
        if lost_any {
            self.advance();
        }
        lost_any
    }

    /// Recomputes the assignment and stores this node's part in its own snapshot.
    ///
    /// ## Returns
    /// - The hall calls this node's elevator should serve.
    pub async fn reassign(&mut self) -> Vec<[bool; 2]> {
        let mut assignment: BTreeMap<NodeId, Vec<[bool; 2]>> = self.assigner.derive_assignment(&self.wv).await;
        let num_floors = self.wv.num_floors as usize;
        let mut tasks = assignment.remove(&self.wv.self_id).unwrap_or_default();
        tasks.resize(num_floors, [false; 2]);

        if let Some(own) = self.wv.self_container_mut() {
            own.tasks = tasks.clone();
        }
        tasks
    }

    /// Completions that should be sent again.
    ///
    /// A completion is done when the record has moved on or every live peer has seen it.
    ///
    /// ## Returns
    /// - A message to broadcast if any completion is due.
    pub fn retransmit_due(&mut self) -> Option<LedgerMessage> {
        let wv = &self.wv;
        self.completions.retain(|call, sent| {
            wv.request(*call).map_or(false, |current| {
                current.status == RequestStatus::Completed
                    && current.version == sent.version
                    && !unaware_peers(wv, *call).is_empty()
            })
        });

        if self.completions.due().is_empty() {
            None
        } else {
            Some(self.message())
        }
    }

    fn advance(&mut self) {
        for (call, status) in advance_barriers(&mut self.wv) {
            print::info(format!("Hall call {:?} is now {:?}", call, status));
        }
    }
}


/// Channels of the synchronizer task.
pub struct SyncChannels {
    /// Reports from the local elevator
    pub local_rx: mpsc::Receiver<LocalEvent>,
    /// Decoded messages from peers
    pub udp_rx: mpsc::Receiver<LedgerMessage>,
    /// Encoded datagrams to the broadcaster
    pub out_tx: mpsc::Sender<Vec<u8>>,
    /// This node's hall calls, to the local elevator
    pub tasks_tx: watch::Sender<Vec<[bool; 2]>>,
    /// Recovered cab calls, to the local elevator
    pub cab_restore_tx: mpsc::Sender<Vec<bool>>,
    /// The published worldview
    pub wv_tx: watch::Sender<WorldView>,
}

async fn broadcast(out_tx: &mpsc::Sender<Vec<u8>>, msg: &LedgerMessage) -> anyhow::Result<()> {
    match serial::encode(msg) {
        Ok(datagram) => {
            if out_tx.send(datagram).await.is_err() {
                bail!("broadcaster stopped");
            }
        }
        Err(e) => print::err(format!("Failed to encode ledger message: {}", e)),
    }
    Ok(())
}

fn publish_tasks(tasks_tx: &watch::Sender<Vec<[bool; 2]>>, tasks: Vec<[bool; 2]>) {
    tasks_tx.send_if_modified(|current| {
        if *current == tasks {
            return false;
        }
        *current = tasks;
        true
    });
}

/// Runs the synchronizer.
///
/// ## Parameters
/// - `sync`: The state, usually fresh from [Synchronizer::new].
/// - `heartbeat`: How often the full ledger is broadcast.
/// - `chs`: See [SyncChannels].
///
/// ## Behavior
/// - Local events and peer messages are handled as they arrive.
/// - The ledger is broadcast every `heartbeat`, and right away after a new call or a completion.
/// - The assignment is recomputed every [config::ASSIGN_PERIOD], right away when a peer is lost
///   and right after this elevator served a call.
///
/// ## Returns
/// - `Ok` when the local elevator is gone, `Err` when the broadcaster is.
pub async fn run_synchronizer(mut sync: Synchronizer, heartbeat: Duration, mut chs: SyncChannels) -> anyhow::Result<()> {
    let mut heartbeat = time::interval(heartbeat);
    let mut watchdog = time::interval(config::WATCHDOG_PERIOD);
    let mut assign = time::interval(config::ASSIGN_PERIOD);
    let mut retransmit = time::interval(config::COMPLETION_RETRANSMIT);
    let mut print_tick = time::interval(config::PRINT_PERIOD);
    for ticker in [&mut heartbeat, &mut watchdog, &mut assign, &mut retransmit, &mut print_tick] {
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    }

    loop {
        tokio::select! {
            event = chs.local_rx.recv() => {
                let Some(event) = event else { return Ok(()) };
                let served = matches!(event, LocalEvent::HallServed(_));
                if let Some(msg) = sync.on_local_event(event) {
                    broadcast(&chs.out_tx, &msg).await?;
                }
                if served {
                    publish_tasks(&chs.tasks_tx, sync.reassign().await);
                }
            }
            Some(msg) = chs.udp_rx.recv() => {
                if let Some(cabs) = sync.on_peer_message(msg) {
                    if chs.cab_restore_tx.send(cabs).await.is_err() {
                        print::warn("Local elevator stopped, recovered cab calls were dropped".to_string());
                    }
                }
            }
            _ = heartbeat.tick() => {
                let msg = sync.message();
                broadcast(&chs.out_tx, &msg).await?;
            }
            _ = watchdog.tick() => {
                if sync.on_watchdog() {
                    publish_tasks(&chs.tasks_tx, sync.reassign().await);
                }
            }
            _ = assign.tick() => {
                publish_tasks(&chs.tasks_tx, sync.reassign().await);
            }
            _ = retransmit.tick() => {
                if let Some(msg) = sync.retransmit_due() {
                    broadcast(&chs.out_tx, &msg).await?;
                }
            }
            _ = print_tick.tick() => {
                print::worldview(sync.world_view());
            }
        }

        chs.wv_tx.send_if_modified(|published| {
            if *published == sync.wv {
                return false;
            }
            *published = sync.wv.clone();
            true
        });
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::AssignerBackend;
    use crate::world_view::{ElevatorContainer, HallDirn};

    const TIMEOUT: Duration = Duration::from_millis(1500);

    fn node(id: NodeId, floor: u8) -> Synchronizer {
        let mut sync = Synchronizer::new(id, 4, Assigner::new(AssignerBackend::Native), TIMEOUT);
        let mut state = ElevatorContainer::new(id, 4);
        state.floor = Some(floor);
        sync.on_local_event(LocalEvent::State(state));
        sync
    }

    fn exchange(a: &mut Synchronizer, b: &mut Synchronizer) {
        let to_b = a.message();
        let to_a = b.message();
        b.on_peer_message(to_b);
        a.on_peer_message(to_a);
    }

    #[tokio::test(start_paused = true)]
    async fn lone_node_confirms_and_takes_its_own_call() {
        let mut a = node(1, 0);
        let call = HallCall::new(2, HallDirn::Up);
        assert!(a.on_local_event(LocalEvent::HallButton(call)).is_some());
        assert_eq!(a.world_view().request(call).unwrap().status, RequestStatus::Confirmed);

        let tasks = a.reassign().await;
        assert!(tasks[2][0]);
        assert!(a.world_view().self_container().unwrap().tasks[2][0]);
    }

    #[tokio::test(start_paused = true)]
    async fn pressing_a_pending_call_again_changes_nothing() {
        let mut a = node(1, 0);
        let call = HallCall::new(1, HallDirn::Down);
        a.on_local_event(LocalEvent::HallButton(call));
        let before = a.world_view().request(call).cloned();
        assert!(a.on_local_event(LocalEvent::HallButton(call)).is_none());
        assert_eq!(a.world_view().request(call).cloned(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn call_waits_for_peer_before_confirming() {
        let mut a = node(1, 0);
        let mut b = node(2, 3);
        exchange(&mut a, &mut b);

        let call = HallCall::new(1, HallDirn::Up);
        let msg = b.on_local_event(LocalEvent::HallButton(call)).unwrap();
        assert_eq!(b.world_view().request(call).unwrap().status, RequestStatus::Unconfirmed);
        // Not confirmed, so nobody serves it yet
        assert!(b.reassign().await.iter().all(|row| !row[0] && !row[1]));

        a.on_peer_message(msg);
        exchange(&mut a, &mut b);
        assert_eq!(b.world_view().request(call).unwrap().status, RequestStatus::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_is_retransmitted_until_everyone_saw_it() {
        let mut a = node(1, 0);
        let mut b = node(2, 3);
        exchange(&mut a, &mut b);

        let call = HallCall::new(0, HallDirn::Up);
        if let Some(msg) = a.on_local_event(LocalEvent::HallButton(call)) {
            b.on_peer_message(msg);
        }
        exchange(&mut a, &mut b);
        assert_eq!(a.world_view().request(call).unwrap().status, RequestStatus::Confirmed);

        assert!(a.on_local_event(LocalEvent::HallServed(call)).is_some());
        assert_eq!(a.pending_completions(), 1);

        // First send lost; the retransmission is due one period later
        assert!(a.retransmit_due().is_none());
        time::advance(config::COMPLETION_RETRANSMIT).await;
        let again = a.retransmit_due().unwrap();

        b.on_peer_message(again);
        exchange(&mut a, &mut b);
        assert!(a.retransmit_due().is_none());
        assert_eq!(a.pending_completions(), 0);
        assert_eq!(a.world_view().request(call).unwrap().status, RequestStatus::Absent);
        assert_eq!(a.world_view().request(call), b.world_view().request(call));
    }

    #[tokio::test(start_paused = true)]
    async fn serving_a_call_twice_completes_it_once() {
        let mut a = node(1, 0);
        let call = HallCall::new(0, HallDirn::Up);
        a.on_local_event(LocalEvent::HallButton(call));
        assert!(a.on_local_event(LocalEvent::HallServed(call)).is_some());
        assert!(a.on_local_event(LocalEvent::HallServed(call)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_press_stops_resending_the_old_completion() {
        let mut a = node(1, 0);
        let mut b = node(2, 3);
        exchange(&mut a, &mut b);

        let call = HallCall::new(2, HallDirn::Down);
        if let Some(msg) = a.on_local_event(LocalEvent::HallButton(call)) {
            b.on_peer_message(msg);
        }
        exchange(&mut a, &mut b);
        a.on_local_event(LocalEvent::HallServed(call));
        assert_eq!(a.pending_completions(), 1);

        // Pressed again before b saw the completion
        assert!(a.on_local_event(LocalEvent::HallButton(call)).is_some());
        assert_eq!(a.pending_completions(), 0);
        assert_eq!(a.world_view().request(call).unwrap().status, RequestStatus::Unconfirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn press_made_alone_is_not_lost_when_the_fleet_is_found() {
        let call = HallCall::new(1, HallDirn::Up);
        let mut a = node(1, 0);
        a.on_local_event(LocalEvent::HallButton(call));
        a.on_local_event(LocalEvent::HallServed(call));
        assert_eq!(a.world_view().request(call).unwrap().status, RequestStatus::Absent);

        let mut b = node(2, 3);
        b.on_local_event(LocalEvent::HallButton(call));
        assert_eq!(b.world_view().request(call).unwrap().status, RequestStatus::Confirmed);

        b.on_peer_message(a.message());
        let record = b.world_view().request(call).unwrap().clone();
        assert_eq!((record.status, record.origin), (RequestStatus::Unconfirmed, 2));
        assert!(record.version > a.world_view().request(call).unwrap().version);

        exchange(&mut a, &mut b);
        exchange(&mut a, &mut b);
        assert_eq!(a.world_view().request(call).unwrap().status, RequestStatus::Confirmed);
        assert_eq!(a.world_view().request(call), b.world_view().request(call));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_peer_is_reported_once() {
        let mut a = node(1, 0);
        let mut b = node(2, 3);
        exchange(&mut a, &mut b);
        assert!(a.world_view().is_alive(2));

        time::advance(TIMEOUT + Duration::from_millis(1)).await;
        assert!(a.on_watchdog());
        assert!(!a.world_view().is_alive(2));
        assert!(!a.on_watchdog());
        // The snapshot is kept
        assert!(a.world_view().elevator_containers.contains_key(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn restarted_node_gets_its_cab_calls_back() {
        let mut a = node(1, 0);
        let mut b = node(2, 3);
        let mut state = b.world_view().self_container().unwrap().clone();
        state.cab_requests[1] = true;
        b.on_local_event(LocalEvent::State(state));
        exchange(&mut a, &mut b);

        let mut b_again = node(2, 3);
        let cabs = b_again.on_peer_message(a.message());
        assert_eq!(cabs, Some(vec![false, true, false, false]));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_as_a_task() {
        let (local_tx, local_rx) = mpsc::channel(8);
        let (_udp_tx, udp_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let (tasks_tx, mut tasks_rx) = watch::channel(vec![[false; 2]; 4]);
        let (cab_restore_tx, _cab_rx) = mpsc::channel(1);
        let (wv_tx, wv_rx) = watch::channel(WorldView::new(1, 4));
        let chs = SyncChannels { local_rx, udp_rx, out_tx, tasks_tx, cab_restore_tx, wv_tx };
        let handle = tokio::spawn(run_synchronizer(node(1, 0), config::HEARTBEAT_PERIOD, chs));

        let call = HallCall::new(3, HallDirn::Down);
        local_tx.send(LocalEvent::HallButton(call)).await.unwrap();

        let datagram = out_rx.recv().await.unwrap();
        assert_eq!(serial::decode(&datagram).unwrap().origin, 1);

        tasks_rx.changed().await.unwrap();
        assert!(tasks_rx.borrow()[3][1]);
        assert_eq!(wv_rx.borrow().request(call).unwrap().status, RequestStatus::Confirmed);

        drop(local_tx);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_running_when_recovered_cab_calls_have_nowhere_to_go() {
        let mut before_restart = node(1, 0);
        let mut peer = node(2, 3);
        let mut state = before_restart.world_view().self_container().unwrap().clone();
        state.cab_requests[2] = true;
        before_restart.on_local_event(LocalEvent::State(state));
        exchange(&mut before_restart, &mut peer);

        let (local_tx, local_rx) = mpsc::channel(8);
        let (udp_tx, udp_rx) = mpsc::channel(8);
        let (out_tx, _out_rx) = mpsc::channel(64);
        let (tasks_tx, _tasks_rx) = watch::channel(vec![[false; 2]; 4]);
        let (cab_restore_tx, cab_rx) = mpsc::channel(1);
        let (wv_tx, mut wv_rx) = watch::channel(WorldView::new(1, 4));
        drop(cab_rx);
        let chs = SyncChannels { local_rx, udp_rx, out_tx, tasks_tx, cab_restore_tx, wv_tx };
        let handle = tokio::spawn(run_synchronizer(node(1, 0), config::HEARTBEAT_PERIOD, chs));

        udp_tx.send(peer.message()).await.unwrap();
        wv_rx.wait_for(|wv| wv.is_alive(2)).await.unwrap();

        drop(local_tx);
        assert!(handle.await.unwrap().is_ok());
    }
}
