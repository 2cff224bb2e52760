//! ## Manager module
//!
//! Decides which elevator serves which hall call.
//!
//! Every node runs the assignment itself on its own worldview and only acts on the part naming
//! itself. Since the inputs converge and the assigner is deterministic, the nodes agree without
//! ever sending an assignment over the network.
//!
//! ### Sub-modules
//! - [cost]: the native assigner.
//! - [json_serial]: the external `hall_request_assigner` executable.
//!
//! Only [RequestStatus::Confirmed] hall calls are handed out.

pub mod cost;
pub mod json_serial;

use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::time::{Duration, Instant};

use crate::config;
use crate::print;
use crate::world_view::{NodeId, WorldView};
use crate::world_view::hall_request::RequestStatus;

/// Which assigner computes the task tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignerBackend {
    /// [cost::assign]
    Native,
    /// The executable at the path, falling back to [cost::assign] on any failure.
    External(PathBuf),
}

/// Turns a worldview into one task table per elevator.
///
/// Holds the only state the assignment needs beyond the worldview: when each connected elevator
/// was first seen unavailable. Such an elevator keeps the calls it had for
/// [config::UNAVAILABLE_GRACE] before they are handed to someone else.
#[derive(Debug)]
pub struct Assigner {
    backend: AssignerBackend,
    grace: Duration,
    unavailable_since: BTreeMap<NodeId, Instant>,
}

impl Assigner {
    #[allow(missing_docs)]
    pub fn new(backend: AssignerBackend) -> Self {
        Self::with_grace(backend, config::UNAVAILABLE_GRACE)
    }

    /// Like [Assigner::new] with a custom pinning grace.
    pub fn with_grace(backend: AssignerBackend, grace: Duration) -> Self {
        Self { backend, grace, unavailable_since: BTreeMap::new() }
    }

    /// Computes the task tables for `wv`.
    ///
    /// ## Behavior
    /// - Confirmed calls still held by a connected, unavailable elevator within its grace stay
    ///   with it.
    /// - The remaining Confirmed calls go to connected, assignable elevators.
    /// - With nobody to give them to, calls are left out and stay pending.
    ///
    /// ## Returns
    /// - A task table for every elevator that got a say. Elevators not in the map have no tasks.
    pub async fn derive_assignment(&mut self, wv: &WorldView) -> BTreeMap<NodeId, Vec<[bool; 2]>> {
        let mut pool = wv.hall_table(RequestStatus::Confirmed);
        let pinned = self.pin(wv, &mut pool);
        let candidates = wv.assignable_containers();

        let mut assignment = match &self.backend {
            AssignerBackend::Native => cost::assign(&pool, &candidates),
            AssignerBackend::External(path) => {
                match json_serial::run_cost_algorithm(path, &pool, &candidates).await {
                    Ok(out) => out,
                    Err(e) => {
                        print::warn(format!("External assigner failed, using native: {:#}", e));
                        cost::assign(&pool, &candidates)
                    }
                }
            }
        };

        for (id, tasks) in pinned {
            let entry = assignment.entry(id)
                .or_insert_with(|| vec![[false; 2]; wv.num_floors as usize]);
            for (row, pinned_row) in entry.iter_mut().zip(tasks.iter()) {
                row[0] |= pinned_row[0];
                row[1] |= pinned_row[1];
            }
        }
        assignment
    }

    /// Takes the calls of unavailable elevators still within their grace out of `pool`.
    fn pin(&mut self, wv: &WorldView, pool: &mut [[bool; 2]]) -> BTreeMap<NodeId, Vec<[bool; 2]>> {
        let now = Instant::now();
        let unavailable: Vec<NodeId> = wv.elevator_containers.iter()
            .filter(|(id, elev)| wv.is_alive(**id) && !elev.is_assignable())
            .map(|(id, _)| *id)
            .collect();

        self.unavailable_since.retain(|id, _| unavailable.contains(id));
        for id in &unavailable {
            self.unavailable_since.entry(*id).or_insert(now);
        }

        let mut pinned = BTreeMap::new();
        for (id, since) in self.unavailable_since.iter() {
            if now.duration_since(*since) >= self.grace {
                continue;
            }
            let Some(elev) = wv.elevator_containers.get(id) else { continue };

            let mut kept = vec![[false; 2]; pool.len()];
            let mut any = false;
            for (floor, row) in pool.iter_mut().enumerate() {
                for dirn in 0..2 {
                    let held = elev.tasks.get(floor).map_or(false, |t| t[dirn]);
                    if held && row[dirn] {
                        kept[floor][dirn] = true;
                        row[dirn] = false;
                        any = true;
                    }
                }
            }
            if any {
                pinned.insert(*id, kept);
            }
        }
        pinned
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_view::{ElevatorContainer, HallCall, HallDirn};

    fn confirmed(wv: &mut WorldView, call: HallCall) {
        let req = wv.request_mut(call).unwrap();
        req.status = RequestStatus::Confirmed;
        req.version = 1;
    }

    fn fleet() -> WorldView {
        let mut wv = WorldView::new(1, 4);
        wv.self_container_mut().unwrap().floor = Some(0);
        for id in [2, 3] {
            let mut e = ElevatorContainer::new(id, 4);
            e.floor = Some(3);
            wv.elevator_containers.insert(id, e);
            wv.alive.insert(id);
        }
        wv
    }

    #[tokio::test]
    async fn only_confirmed_calls_are_assigned() {
        let mut wv = fleet();
        confirmed(&mut wv, HallCall::new(1, HallDirn::Up));
        wv.request_mut(HallCall::new(2, HallDirn::Up)).unwrap().observe(1);

        let out = Assigner::new(AssignerBackend::Native).derive_assignment(&wv).await;
        assert!(out[&1][1][0]);
        assert!(out.values().all(|t| !t[2][0]));
    }

    #[tokio::test]
    async fn disconnected_elevators_get_nothing() {
        let mut wv = fleet();
        wv.alive.remove(&2);
        wv.alive.remove(&3);
        confirmed(&mut wv, HallCall::new(3, HallDirn::Down));

        let out = Assigner::new(AssignerBackend::Native).derive_assignment(&wv).await;
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert!(out[&1][3][1]);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_elevator_keeps_its_calls_for_the_grace() {
        let call = HallCall::new(3, HallDirn::Down);
        let mut wv = fleet();
        confirmed(&mut wv, call);
        let mut assigner = Assigner::with_grace(AssignerBackend::Native, Duration::from_secs(5));

        let first = assigner.derive_assignment(&wv).await;
        assert!(first[&2][3][1]);

        let two = wv.elevator_containers.get_mut(&2).unwrap();
        two.tasks = first[&2].clone();
        two.door_stuck = true;

        let pinned = assigner.derive_assignment(&wv).await;
        assert!(pinned[&2][3][1]);
        assert!(!pinned[&3][3][1]);

        tokio::time::advance(Duration::from_secs(5)).await;
        let released = assigner.derive_assignment(&wv).await;
        assert!(!released.get(&2).map_or(false, |t| t[3][1]));
        assert!(released[&3][3][1]);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_elevator_gets_no_new_calls() {
        let mut wv = fleet();
        wv.elevator_containers.get_mut(&2).unwrap().motor_stuck = true;
        wv.elevator_containers.get_mut(&3).unwrap().motor_stuck = true;
        confirmed(&mut wv, HallCall::new(3, HallDirn::Down));

        let out = Assigner::new(AssignerBackend::Native).derive_assignment(&wv).await;
        assert!(out[&1][3][1]);
        assert!(!out.contains_key(&2) && !out.contains_key(&3));
    }

    #[tokio::test]
    async fn broken_external_assigner_falls_back_to_native() {
        let mut wv = fleet();
        confirmed(&mut wv, HallCall::new(1, HallDirn::Up));
        let backend = AssignerBackend::External(PathBuf::from("/nonexistent/hall_request_assigner"));

        let out = Assigner::new(backend).derive_assignment(&wv).await;
        assert_eq!(out, cost::assign(&wv.hall_table(RequestStatus::Confirmed), &wv.assignable_containers()));
    }
}
