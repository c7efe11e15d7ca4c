//! Runtime that drives the simulated vehicle and its broadcasters.
//!
//! [`VehicleBus::start`] spawns the periodic tasks onto the current tokio
//! runtime:
//!
//! - one dynamics task on a fixed real-time interval,
//! - one publish loop per [`BroadcastGroup`], each recomputing its own delay,
//! - a snapshot publisher that pushes the frame log to watchers at a bounded
//!   rate, only when it changed.
//!
//! The vehicle store and the frame log each sit behind their own mutex.
//! Every command is applied while holding the store lock and no task holds
//! a lock across an await point.

use crate::broadcast::{next_delay, BroadcastGroup};
use crate::codec::Frame;
use crate::config::SimulationConfig;
use crate::error::BusError;
use crate::frame_log::{FrameLog, FrameLogStats, LogSnapshot};
use crate::vehicle::{
    CommandEffect, DynamicsSimulator, StartToken, StoreStats, VehicleState, VehicleStore,
};
use crate::vehicle::store::VehicleCommand;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Frames a lagging live subscriber may fall behind before it skips ahead.
pub const FRAME_BROADCAST_BUFFER_SIZE: usize = 256;

/// Cloneable access to a running bus.
#[derive(Debug, Clone)]
pub struct BusHandle {
    store: Arc<Mutex<VehicleStore>>,
    log: Arc<Mutex<FrameLog>>,
    snapshot_tx: Arc<watch::Sender<LogSnapshot>>,
    snapshot_rx: watch::Receiver<LogSnapshot>,
    frame_tx: broadcast::Sender<Frame>,
    shutdown_rx: watch::Receiver<bool>,
    config: Arc<SimulationConfig>,
    started_at: Instant,
}

/// Owns the spawned tasks. Dropping it without calling
/// [`VehicleBus::shutdown`] still stops them, but nothing waits for them.
#[derive(Debug)]
pub struct VehicleBus {
    handle: BusHandle,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl VehicleBus {
    /// Validates `config` and spawns every periodic task. Must be called from
    /// within a tokio runtime.
    pub fn start(config: SimulationConfig) -> Result<Self, BusError> {
        config.validate()?;

        let log = FrameLog::with_limit(config.frame_log_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(log.snapshot());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (frame_tx, _) = broadcast::channel(FRAME_BROADCAST_BUFFER_SIZE);

        let handle = BusHandle {
            store: Arc::new(Mutex::new(VehicleStore::new())),
            log: Arc::new(Mutex::new(log)),
            snapshot_tx: Arc::new(snapshot_tx),
            snapshot_rx,
            frame_tx,
            shutdown_rx,
            config: Arc::new(config),
            started_at: Instant::now(),
        };

        let mut tasks = Vec::with_capacity(BroadcastGroup::ALL.len() + 2);
        tasks.push(tokio::spawn(run_dynamics(handle.clone())));
        for group in BroadcastGroup::ALL {
            tasks.push(tokio::spawn(run_broadcast(handle.clone(), group)));
        }
        tasks.push(tokio::spawn(run_snapshot_publisher(handle.clone())));

        info!(
            dynamics_period_ms = handle.config.dynamics_period_ms,
            frame_log_capacity = handle.config.frame_log_capacity,
            "vehicle bus started"
        );

        Ok(Self {
            handle,
            shutdown_tx,
            tasks,
        })
    }

    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }

    /// Signals every task to stop at its next loop boundary and waits for
    /// them to finish.
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("bus task ended abnormally: {}", e);
            }
        }
        info!("vehicle bus stopped");
    }
}

impl BusHandle {
    /// Applies `command` to the vehicle. A START schedules the delayed
    /// engine start on the runtime.
    pub async fn execute(&self, command: VehicleCommand) -> CommandEffect {
        debug!(?command, "executing vehicle command");
        let effect = self.store.lock().await.apply(command);
        if let CommandEffect::ScheduleEngineStart(token) = effect {
            self.schedule_engine_start(token);
        }
        effect
    }

    pub async fn vehicle_state(&self) -> VehicleState {
        self.store.lock().await.state().clone()
    }

    pub async fn store_stats(&self) -> StoreStats {
        self.store.lock().await.stats()
    }

    pub async fn pause_log(&self) {
        let mut log = self.log.lock().await;
        log.pause();
        self.publish(&log);
    }

    pub async fn resume_log(&self) {
        let mut log = self.log.lock().await;
        log.resume();
        self.publish(&log);
    }

    /// Empties the log and publishes the empty snapshot right away.
    pub async fn clear_log(&self) {
        let mut log = self.log.lock().await;
        log.clear();
        self.publish(&log);
    }

    /// Latest published snapshot; may trail the log by one publish interval.
    pub fn log_snapshot(&self) -> LogSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe_log(&self) -> watch::Receiver<LogSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Live feed of every frame that made it into the log.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        self.frame_tx.subscribe()
    }

    /// Coherent copy of the log as of now, bypassing the publish interval.
    pub async fn current_log(&self) -> LogSnapshot {
        self.log.lock().await.snapshot()
    }

    /// Up to `limit` most recent frames, newest first.
    pub async fn recent_frames(&self, limit: usize) -> Vec<Frame> {
        self.log.lock().await.latest(limit)
    }

    pub async fn log_stats(&self) -> FrameLogStats {
        self.log.lock().await.stats()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Milliseconds since the bus started; the clock frames are stamped with.
    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn publish(&self, log: &FrameLog) {
        self.snapshot_tx.send_replace(log.snapshot());
    }

    fn schedule_engine_start(&self, token: StartToken) {
        let store = Arc::clone(&self.store);
        let delay = Duration::from_millis(self.config.engine_start_delay_ms);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    if !store.lock().await.complete_engine_start(token) {
                        debug!(?token, "engine start superseded");
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => {}
            }
        });
    }
}

/// Resolves once shutdown is signalled or the bus owner is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stopping = *shutdown.borrow_and_update();
        if stopping || shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn run_dynamics(bus: BusHandle) {
    let mut shutdown = bus.shutdown_rx.clone();
    let mut interval = time::interval(Duration::from_millis(bus.config.dynamics_period_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut simulator = DynamicsSimulator::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }

        let mut store = bus.store.lock().await;
        if let Some(update) = simulator.step(store.state()) {
            store.apply(VehicleCommand::ApplyDynamicsTick(update));
        }
    }

    debug!(
        ticks = simulator.ticks(),
        commits = simulator.commits(),
        "dynamics task stopped"
    );
}

async fn run_broadcast(bus: BusHandle, group: BroadcastGroup) {
    let mut shutdown = bus.shutdown_rx.clone();
    let base_period_ms = group.base_period_ms(&bus.config);
    let mut emitted: u64 = 0;

    loop {
        let (frames, delay) = {
            let store = bus.store.lock().await;
            let state = store.state();
            (
                group.frames(state, bus.uptime_ms()),
                next_delay(base_period_ms, state.simulation_speed),
            )
        };

        if !frames.is_empty() {
            let mut log = bus.log.lock().await;
            for frame in frames {
                if log.append(frame.clone()) {
                    // No live subscribers is not an error
                    let _ = bus.frame_tx.send(frame);
                }
                emitted += 1;
            }
        }

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    debug!(%group, emitted, "broadcast loop stopped");
}

async fn run_snapshot_publisher(bus: BusHandle) {
    let mut shutdown = bus.shutdown_rx.clone();
    let mut interval = time::interval(Duration::from_millis(bus.config.snapshot_interval_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut published_revision = bus.snapshot_rx.borrow().revision;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }

        let log = bus.log.lock().await;
        if log.revision() != published_revision {
            published_revision = log.revision();
            bus.publish(&log);
        }
    }
}
