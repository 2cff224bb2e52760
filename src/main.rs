use anyhow::Context;
use tokio::sync::{mpsc, watch};

use elevator_sync::{config, elevator_logic, init, print, synchronizer};
use elevator_sync::elevator_logic::{LocalElevatorChannels, LocalEvent};
use elevator_sync::elevio::{elev::Elevator, poll, HardwareEvent};
use elevator_sync::manager::Assigner;
use elevator_sync::network::udp_broadcast;
use elevator_sync::synchronizer::{SyncChannels, Synchronizer};
use elevator_sync::world_view::{serial::LedgerMessage, WorldView};


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = init::parse_args()?;
    let self_id = init::node_id(&cfg)?;
    print::info(format!("Starting node {} with {} floors", self_id, cfg.num_floors));

    /* START ----------- Connect to the elevator server ---------------------- */
    let elevator = {
        let addr = cfg.elev_addr.clone();
        let num_floors = cfg.num_floors;
        tokio::task::spawn_blocking(move || Elevator::init(&addr, num_floors))
            .await
            .context("elevator connection task panicked")?
            .with_context(|| format!("could not connect to the elevator server at {}", cfg.elev_addr))?
    };
    print::ok(format!("Connected to {}", elevator));
    /* SLUTT ----------- Connect to the elevator server ---------------------- */

    /* START ----------- Channels ---------------------- */
    let (hw_tx, hw_rx) = mpsc::channel::<HardwareEvent>(100);
    let (local_tx, local_rx) = mpsc::channel::<LocalEvent>(100);
    let (udp_tx, udp_rx) = mpsc::channel::<LedgerMessage>(100);
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(100);
    let (cab_restore_tx, cab_restore_rx) = mpsc::channel::<Vec<bool>>(4);
    let (tasks_tx, tasks_rx) = watch::channel(vec![[false; 2]; cfg.num_floors as usize]);
    let (wv_tx, wv_rx) = watch::channel(WorldView::new(self_id, cfg.num_floors));
    /* SLUTT ----------- Channels ---------------------- */

    let _bridge = poll::bridge(poll::spawn_pollers(&elevator, config::ELEV_POLL), hw_tx);

    let sync_task = {
        let sync = Synchronizer::new(self_id, cfg.num_floors, Assigner::new(init::assigner_backend(&cfg)), cfg.disconnect_timeout);
        let chs = SyncChannels { local_rx, udp_rx, out_tx, tasks_tx, cab_restore_tx, wv_tx };
        let heartbeat = cfg.heartbeat;
        tokio::spawn(async move {
            print::info("Starting synchronizer".to_string());
            synchronizer::run_synchronizer(sync, heartbeat, chs).await
        })
    };

    let listen_task = {
        let port = cfg.port;
        tokio::spawn(async move {
            print::info("Listening for UDP broadcasts".to_string());
            udp_broadcast::start_udp_listener(port, self_id, udp_tx).await
        })
    };

    let broadcast_task = {
        let port = cfg.port;
        tokio::spawn(async move {
            print::info("Starting UDP broadcaster".to_string());
            udp_broadcast::start_udp_broadcaster(port, out_rx).await
        })
    };

    let lights_task = {
        let e = elevator.clone();
        let num_floors = cfg.num_floors;
        tokio::spawn(async move { elevator_logic::lights::run_lights(e, num_floors, wv_rx).await })
    };

    let elevator_task = {
        let chs = LocalElevatorChannels { hw_rx, tasks_rx, cab_restore_rx, local_tx };
        let (num_floors, door_open) = (cfg.num_floors, cfg.door_open);
        tokio::spawn(async move {
            print::info("Starting local elevator".to_string());
            elevator_logic::run_local_elevator(elevator, self_id, num_floors, door_open, chs).await
        })
    };

    // Every task runs for the lifetime of the node; the first one to stop takes it down.
    let (name, result) = tokio::select! {
        r = elevator_task => ("local elevator", r),
        r = lights_task => ("lights", r),
        r = sync_task => ("synchronizer", r),
        r = listen_task => ("UDP listener", r),
        r = broadcast_task => ("UDP broadcaster", r),
    };

    match result {
        Ok(Ok(())) => anyhow::bail!("{} stopped", name),
        Ok(Err(e)) => {
            print::err(format!("{} failed: {:#}", name, e));
            Err(e.context(format!("{} failed", name)))
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("{} panicked", name))),
    }
}
