//! Real-time driver for the [`Engine`].
//!
//! One tokio task owns the clock side of the simulation: it locks the engine,
//! fires everything that is due, hands queued mirror writes to the [`Mirror`],
//! and sleeps until the next timer or until a control call wakes it.
//!
//! Simulated time is the clock's reading at spawn plus tokio-elapsed time, so
//! tests running on a paused tokio clock drive the simulation deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::dead_letter::DeadLetterSink;
use crate::engine::Engine;
use crate::error::SimulationError;
use crate::mirror::{self, Mirror, MirrorConfig, OnCreated};
use crate::stats::SimulationStats;
use crate::store::OrderStore;
use crate::types::{ExternalOrderId, OrderId, RunState, SimulatedOrder, SimulationConfig, StageTransition};

struct Shared {
    engine: Mutex<Engine>,
    wake: Notify,
    epoch_ms: u64,
    origin: Instant,
    mirror: Mirror,
    shutdown: AtomicBool,
}

impl Shared {
    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> u64 {
        self.epoch_ms + self.origin.elapsed().as_millis() as u64
    }

    fn instant_at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms.saturating_sub(self.epoch_ms))
    }

    /// Runs `op` against the engine at the current time, then forwards queued
    /// mirror writes and wakes the driver.
    fn control<T>(&self, op: impl FnOnce(&mut Engine, u64) -> T) -> T {
        let (out, commands) = {
            let mut engine = self.engine();
            let now = self.now_ms();
            let out = op(&mut *engine, now);
            (out, engine.take_mirror_commands())
        };
        for command in commands {
            self.mirror.submit(command);
        }
        self.wake.notify_one();
        out
    }
}

/// Point-in-time view of the runner, served by `GET /simulation/state`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct RunnerState {
    pub run_state: RunState,
    pub config: Option<SimulationConfig>,
    pub now_ms: u64,
    pub pending_timers: usize,
    pub next_due_ms: Option<u64>,
    pub mirror_queued: usize,
}

/// Handle to a running simulation driver. Cheap to clone.
#[derive(Clone)]
pub struct SimulationHandle {
    shared: Arc<Shared>,
}

impl SimulationHandle {
    /// Spawns the driver and the mirror worker on the current tokio runtime.
    pub fn spawn(
        engine: Engine,
        store: Arc<dyn OrderStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
        mirror_config: MirrorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let on_created: OnCreated = Arc::new(move |id: OrderId, external_id: ExternalOrderId| {
                if let Some(shared) = weak.upgrade() {
                    shared.control(|engine, _| engine.attach_external_id(id, external_id));
                }
            });
            let (mirror, _worker) = mirror::spawn_mirror(store, mirror_config, dead_letters, on_created);
            Shared {
                engine: Mutex::new(engine),
                wake: Notify::new(),
                epoch_ms: clock.now_ms(),
                origin: Instant::now(),
                mirror,
                shutdown: AtomicBool::new(false),
            }
        });
        tokio::spawn(drive(Arc::clone(&shared)));
        Self { shared }
    }

    /// Starts a run. A stopped simulation is reset first.
    pub fn start(&self, config: SimulationConfig) -> Result<(), SimulationError> {
        self.shared.control(|engine, now| {
            if engine.run_state() == RunState::Stopped {
                engine.reset();
            }
            engine.start(config, now)
        })
    }

    pub fn pause(&self) {
        self.shared.control(|engine, now| engine.pause(now));
    }

    pub fn resume(&self) {
        self.shared.control(|engine, now| engine.resume(now));
    }

    pub fn stop(&self) {
        self.shared.control(|engine, now| engine.stop(now));
    }

    /// Stops any active run and returns to idle.
    pub fn reset(&self) {
        self.shared.control(|engine, now| {
            engine.stop(now);
            engine.reset();
        });
    }

    pub fn now_ms(&self) -> u64 {
        self.shared.now_ms()
    }

    pub fn run_state(&self) -> RunState {
        self.shared.engine().run_state()
    }

    pub fn active_orders(&self) -> Vec<SimulatedOrder> {
        self.shared.engine().active_orders()
    }

    pub fn order(&self, id: OrderId) -> Option<SimulatedOrder> {
        self.shared.engine().order(id)
    }

    /// Statistics recomputed at the current time.
    pub fn stats(&self) -> SimulationStats {
        let now = self.shared.now_ms();
        self.shared.engine().refresh_stats(now)
    }

    pub fn recent_transitions(&self) -> Vec<StageTransition> {
        self.shared.engine().recent_transitions()
    }

    pub fn wait_estimate(&self, id: OrderId) -> Option<u64> {
        self.shared.engine().wait_estimate(id)
    }

    pub fn state(&self) -> RunnerState {
        let now_ms = self.shared.now_ms();
        let mut engine = self.shared.engine();
        RunnerState {
            run_state: engine.run_state(),
            config: engine.config().cloned(),
            now_ms,
            pending_timers: engine.pending_timers().len(),
            next_due_ms: engine.next_due(),
            mirror_queued: self.shared.mirror.queued(),
        }
    }

    /// Ends the driver task. Timers stop firing; the engine keeps its state.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}

async fn drive(shared: Arc<Shared>) {
    info!("simulation driver started");
    let mut reached = 0;
    loop {
        // Registered before the engine is read so a control call in between is not lost.
        let notified = shared.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let (fired, commands, next_due) = {
            let mut engine = shared.engine();
            let fired = engine.advance_to(shared.now_ms().max(reached));
            (fired, engine.take_mirror_commands(), engine.next_due())
        };
        if fired > 0 {
            debug!("driver tick fired={} mirror_writes={}", fired, commands.len());
        }
        for command in commands {
            shared.mirror.submit(command);
        }
        match next_due {
            Some(due) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(shared.instant_at(due)) => reached = due,
                    _ = &mut notified => {}
                }
            }
            None => notified.await,
        }
    }
    info!("simulation driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dead_letter::InMemoryDeadLetterSink;
    use crate::stage::Stage;
    use crate::store::{InMemoryOrderStore, StaticMenu};
    use crate::types::ArrivalRate;

    fn init_log() {
        let _ = env_logger::try_init();
    }

    fn spawn(seed: u64) -> (SimulationHandle, Arc<InMemoryOrderStore>, InMemoryDeadLetterSink) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_hour(12));
        let engine = Engine::with_seed(Arc::new(StaticMenu::default_menu()), Arc::clone(&clock), seed);
        let store = Arc::new(InMemoryOrderStore::new());
        let sink = InMemoryDeadLetterSink::new();
        let handle = SimulationHandle::spawn(
            engine,
            store.clone(),
            Arc::new(sink.clone()),
            MirrorConfig::default(),
            clock,
        );
        (handle, store, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn orders_flow_through_and_get_mirrored() {
        init_log();
        let (handle, store, sink) = spawn(1);
        handle.start(SimulationConfig::new(10.0, ArrivalRate::Rush)).unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        let stats = handle.stats();
        assert!(stats.orders_generated > 0);
        assert!(stats.orders_completed > 0);
        assert!(store.order_count() as u64 >= stats.orders_completed);
        assert!(sink.is_empty());
        assert!(!store.payments().is_empty());
        let mirrored = handle
            .active_orders()
            .into_iter()
            .filter(|o| o.external_order_id.is_some())
            .count();
        assert!(mirrored > 0 || handle.active_orders().is_empty());
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn stage_advances_on_scaled_schedule() {
        init_log();
        let (handle, _store, _sink) = spawn(2);
        handle.start(SimulationConfig::new(2.0, ArrivalRate::Rush)).unwrap();
        let order = loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Some(order) = handle.active_orders().into_iter().next() {
                break order;
            }
        };
        let waited = handle.now_ms() - order.stage_entered_ms;
        let remaining = (Stage::Arrival.base_duration_ms() / 2).saturating_sub(waited);
        tokio::time::sleep(Duration::from_millis(remaining + 1)).await;
        let advanced = handle.order(order.id).unwrap();
        assert_eq!(advanced.stage, Stage::Placement);
        assert_eq!(advanced.stage_entered_ms, order.stage_entered_ms + 1_000);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn control_calls_drive_run_state() {
        init_log();
        let (handle, _store, _sink) = spawn(3);
        assert_eq!(handle.run_state(), RunState::Idle);
        assert!(handle.start(SimulationConfig::new(-1.0, ArrivalRate::Low)).is_err());
        handle.start(SimulationConfig::new(5.0, ArrivalRate::High)).unwrap();
        handle.pause();
        assert_eq!(handle.state().run_state, RunState::Paused);
        handle.resume();
        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.stop();
        assert_eq!(handle.run_state(), RunState::Stopped);
        assert!(handle.active_orders().is_empty());
        assert_eq!(handle.state().pending_timers, 0);

        handle.start(SimulationConfig::new(1.0, ArrivalRate::Low)).unwrap();
        assert_eq!(handle.run_state(), RunState::Running);
        assert_eq!(handle.stats().orders_generated, 0);
        handle.reset();
        assert_eq!(handle.run_state(), RunState::Idle);
        handle.shutdown();
    }
}
