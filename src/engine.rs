//! Discrete-event simulation engine.
//!
//! Owns the fleet of in-flight orders and a table of one-shot timers. Timers are
//! ordered by due time in a min-heap; [`Engine::advance_to`] fires every timer
//! that is due, each at its own due time, so a run is a deterministic function
//! of the seed and the sequence of control calls. The engine performs no I/O:
//! mirror writes are queued as [`MirrorCommand`]s for the host to drain.
//!
//! Run states: `Idle → Running ⇄ Paused → Stopped`. Control calls that do not
//! apply to the current state are no-ops.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::entropy::EntropyPool;
use crate::error::SimulationError;
use crate::mirror::MirrorCommand;
use crate::order_gen::{self, CATALOG_LIMIT};
use crate::random::{self, SeededLcg};
use crate::stage::Stage;
use crate::stats::{self, RunCounters, SimulationStats};
use crate::store::{MenuCatalog, OrderRecord};
use crate::types::{
    ExternalOrderId, OrderId, PauseMode, RunState, SimulatedOrder, SimulationConfig, StageTransition, TimerId,
};

/// Transitions kept for [`Engine::recent_transitions`].
pub const JOURNAL_CAPACITY: usize = 512;

const MINUTE_MS: u64 = 60_000;

/// What a timer does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "order_id", rename_all = "snake_case")]
pub enum TimerEvent {
    /// Generate one order, then schedule the next arrival.
    Arrival,
    /// Move the order to its next stage, or remove it after `invoice`.
    Advance(OrderId),
    /// Wall-clock run limit reached.
    Deadline,
}

#[derive(Clone, Copy, Debug)]
struct Timer {
    event: TimerEvent,
    due_ms: u64,
    delay_ms: u64,
    /// Set while frozen by a preserving pause.
    remaining_ms: Option<u64>,
}

/// Read-only view of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PendingTimer {
    pub id: TimerId,
    pub event: TimerEvent,
    pub due_ms: u64,
    pub frozen: bool,
}

/// Order lifecycle simulation engine.
///
/// Use [`Engine::start`] to begin a run and [`Engine::advance_to`] to let time
/// pass. Readers get clones: [`Engine::active_orders`], [`Engine::stats`].
pub struct Engine {
    catalog: Arc<dyn MenuCatalog>,
    clock: Arc<dyn Clock>,
    rng: SeededLcg,
    entropy: EntropyPool,
    config: Option<SimulationConfig>,
    state: RunState,
    fleet: BTreeMap<OrderId, SimulatedOrder>,
    timers: HashMap<TimerId, Timer>,
    queue: BinaryHeap<Reverse<(u64, TimerId)>>,
    next_timer_id: u64,
    next_order_id: u64,
    counters: RunCounters,
    stats: SimulationStats,
    transitions: VecDeque<StageTransition>,
    outbox: Vec<MirrorCommand>,
}

impl Engine {
    /// Creates an idle engine seeded from the clock.
    pub fn new(catalog: Arc<dyn MenuCatalog>, clock: Arc<dyn Clock>) -> Self {
        let seed = clock.now_ms() ^ 0xA076_1D64_78BD_642F;
        Self::build(catalog, clock, SeededLcg::new(seed), EntropyPool::from_time())
    }

    /// Creates an idle engine whose random streams derive from `seed`.
    pub fn with_seed(catalog: Arc<dyn MenuCatalog>, clock: Arc<dyn Clock>, seed: u64) -> Self {
        let entropy = EntropyPool::new(seed.rotate_left(17) ^ 0xE703_7ED1_A0B4_28DB);
        Self::build(catalog, clock, SeededLcg::new(seed), entropy)
    }

    /// Replaces the entropy pool used for admission decisions.
    pub fn with_entropy(mut self, entropy: EntropyPool) -> Self {
        self.entropy = entropy;
        self
    }

    fn build(catalog: Arc<dyn MenuCatalog>, clock: Arc<dyn Clock>, rng: SeededLcg, entropy: EntropyPool) -> Self {
        Self {
            catalog,
            clock,
            rng,
            entropy,
            config: None,
            state: RunState::Idle,
            fleet: BTreeMap::new(),
            timers: HashMap::new(),
            queue: BinaryHeap::new(),
            next_timer_id: 1,
            next_order_id: 1,
            counters: RunCounters::default(),
            stats: SimulationStats::default(),
            transitions: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    /// Starts a run at `now_ms`.
    ///
    /// Only an idle engine starts; while running or paused this is a no-op, and a
    /// stopped engine must be [`reset`](Self::reset) first.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::InvalidSpeed`] for a zero, negative or
    /// non-finite speed and [`SimulationError::InvalidCapacity`] for a zero
    /// kitchen capacity. The engine stays idle.
    pub fn start(&mut self, config: SimulationConfig, now_ms: u64) -> Result<(), SimulationError> {
        match self.state {
            RunState::Idle => {}
            RunState::Running | RunState::Paused => {
                debug!("start ignored: run already active state={:?}", self.state);
                return Ok(());
            }
            RunState::Stopped => {
                warn!("start ignored: run is stopped, reset the engine first");
                return Ok(());
            }
        }
        config.validate()?;
        info!(
            "simulation started speed={} arrival_rate={} pause_mode={:?} max_orders={:?} max_minutes={:?}",
            config.speed,
            config.arrival_rate.as_str(),
            config.pause_mode,
            config.max_order_count,
            config.max_duration_minutes
        );
        self.counters = RunCounters {
            run_started_ms: Some(now_ms),
            ..Default::default()
        };
        self.state = RunState::Running;
        let deadline = config.max_duration_minutes;
        self.config = Some(config);
        if let Some(minutes) = deadline {
            self.schedule(TimerEvent::Deadline, minutes.saturating_mul(MINUTE_MS), now_ms);
        }
        self.schedule_next_arrival(now_ms);
        self.recompute_stats(now_ms);
        Ok(())
    }

    /// Pauses a running simulation. Idempotent.
    pub fn pause(&mut self, now_ms: u64) {
        if self.state != RunState::Running {
            debug!("pause ignored state={:?}", self.state);
            return;
        }
        self.state = RunState::Paused;
        if self.pause_mode() == PauseMode::Preserve {
            for timer in self.timers.values_mut() {
                if timer.event != TimerEvent::Deadline {
                    timer.remaining_ms = Some(timer.due_ms.saturating_sub(now_ms));
                }
            }
            self.rebuild_queue();
        }
        info!("simulation paused in_flight={} timers={}", self.fleet.len(), self.timers.len());
        self.recompute_stats(now_ms);
    }

    /// Resumes a paused simulation. Idempotent.
    pub fn resume(&mut self, now_ms: u64) {
        if self.state != RunState::Paused {
            debug!("resume ignored state={:?}", self.state);
            return;
        }
        self.state = RunState::Running;
        for (id, timer) in self.timers.iter_mut() {
            if let Some(remaining) = timer.remaining_ms.take() {
                timer.due_ms = now_ms.saturating_add(remaining);
                self.queue.push(Reverse((timer.due_ms, *id)));
            }
        }
        info!("simulation resumed in_flight={}", self.fleet.len());
        self.recompute_stats(now_ms);
    }

    /// Stops the run: cancels every timer and clears the fleet. Idempotent.
    pub fn stop(&mut self, now_ms: u64) {
        if self.state == RunState::Stopped {
            return;
        }
        let cancelled = self.timers.len();
        let dropped = self.fleet.len();
        self.timers.clear();
        self.queue.clear();
        self.fleet.clear();
        self.state = RunState::Stopped;
        info!(
            "simulation stopped cancelled_timers={} dropped_orders={} generated={} completed={} revenue={}",
            cancelled,
            dropped,
            self.counters.orders_generated,
            self.counters.orders_completed,
            self.counters.revenue
        );
        self.recompute_stats(now_ms);
    }

    /// Returns a stopped engine to idle with fresh run counters.
    ///
    /// Order ids keep increasing across runs. No-op while a run is active.
    pub fn reset(&mut self) {
        match self.state {
            RunState::Running | RunState::Paused => {
                debug!("reset ignored: run active state={:?}", self.state);
                return;
            }
            RunState::Idle | RunState::Stopped => {}
        }
        self.timers.clear();
        self.queue.clear();
        self.fleet.clear();
        self.config = None;
        self.counters = RunCounters::default();
        self.stats = SimulationStats::default();
        self.transitions.clear();
        self.state = RunState::Idle;
    }

    /// Fires every timer due at or before `now_ms`, earliest first. Returns how many fired.
    pub fn advance_to(&mut self, now_ms: u64) -> usize {
        let mut fired = 0;
        while let Some(&Reverse((due, id))) = self.queue.peek() {
            if due > now_ms {
                break;
            }
            self.queue.pop();
            if !self.is_live(id, due) {
                continue;
            }
            self.fire_timer(id, due);
            fired += 1;
        }
        fired
    }

    /// Fires one timer immediately, as if it were due at `now_ms`.
    ///
    /// Returns `false` if the timer no longer exists (already fired, cancelled by
    /// [`stop`](Self::stop)) or is frozen by a preserving pause; such calls have no effect.
    pub fn fire(&mut self, timer_id: TimerId, now_ms: u64) -> bool {
        match self.timers.get(&timer_id) {
            Some(timer) if timer.remaining_ms.is_none() => {
                self.fire_timer(timer_id, now_ms);
                true
            }
            _ => false,
        }
    }

    /// Due time of the earliest live timer.
    pub fn next_due(&mut self) -> Option<u64> {
        while let Some(&Reverse((due, id))) = self.queue.peek() {
            if self.is_live(id, due) {
                return Some(due);
            }
            self.queue.pop();
        }
        None
    }

    /// All scheduled timers, earliest first.
    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        let mut pending: Vec<PendingTimer> = self
            .timers
            .iter()
            .map(|(id, t)| PendingTimer {
                id: *id,
                event: t.event,
                due_ms: t.due_ms,
                frozen: t.remaining_ms.is_some(),
            })
            .collect();
        pending.sort_by_key(|t| (t.due_ms, t.id));
        pending
    }

    pub fn run_state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> Option<&SimulationConfig> {
        self.config.as_ref()
    }

    /// In-flight orders in canonical stage order, then by id.
    pub fn active_orders(&self) -> Vec<SimulatedOrder> {
        let mut orders: Vec<SimulatedOrder> = self
            .fleet
            .values()
            .filter(|o| o.stage.is_active())
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.stage.index(), o.id));
        orders
    }

    pub fn order(&self, id: OrderId) -> Option<SimulatedOrder> {
        self.fleet.get(&id).cloned()
    }

    /// Snapshot taken at the last transition or control call.
    pub fn stats(&self) -> SimulationStats {
        self.stats.clone()
    }

    /// Recomputes the snapshot at `now_ms` and returns it.
    pub fn refresh_stats(&mut self, now_ms: u64) -> SimulationStats {
        self.recompute_stats(now_ms);
        self.stats.clone()
    }

    /// Most recent stage transitions, oldest first.
    pub fn recent_transitions(&self) -> Vec<StageTransition> {
        self.transitions.iter().cloned().collect()
    }

    /// Estimated remaining kitchen wait for an in-flight order, in milliseconds.
    pub fn wait_estimate(&self, id: OrderId) -> Option<u64> {
        let order = self.fleet.get(&id)?;
        Some(EntropyPool::fair_wait_estimate(order.items.len() as u32, self.kitchen_load()))
    }

    /// Drains the mirror writes queued since the last call.
    pub fn take_mirror_commands(&mut self) -> Vec<MirrorCommand> {
        std::mem::take(&mut self.outbox)
    }

    /// Records the external id of a mirrored order.
    ///
    /// Returns `false` if the order has already left the fleet. If the order has
    /// moved past the status the record was created with, a status update is queued.
    pub fn attach_external_id(&mut self, id: OrderId, external_id: ExternalOrderId) -> bool {
        let Some(order) = self.fleet.get_mut(&id) else {
            debug!("external id for departed order order_id={} external_id={}", id, external_id);
            return false;
        };
        if order.external_order_id.is_some() {
            return true;
        }
        order.external_order_id = Some(external_id.clone());
        let status = order.stage.external_status();
        let paid = order.revenue_recognized.then_some(order.total);
        if status != Stage::Arrival.external_status() {
            self.outbox.push(MirrorCommand::UpdateStatus {
                order_id: id,
                external_id: external_id.clone(),
                status,
            });
        }
        // Payment was recognized before the record existed; mirror it now.
        if let Some(amount) = paid {
            let method = order_gen::draw_payment_method(&mut self.rng);
            self.outbox.push(MirrorCommand::CreatePayment {
                order_id: id,
                external_id,
                method,
                amount,
            });
        }
        true
    }

    fn pause_mode(&self) -> PauseMode {
        self.config.as_ref().map(|c| c.pause_mode).unwrap_or_default()
    }

    fn is_live(&self, id: TimerId, due: u64) -> bool {
        self.timers
            .get(&id)
            .is_some_and(|t| t.due_ms == due && t.remaining_ms.is_none())
    }

    fn rebuild_queue(&mut self) {
        self.queue = self
            .timers
            .iter()
            .filter(|(_, t)| t.remaining_ms.is_none())
            .map(|(id, t)| Reverse((t.due_ms, *id)))
            .collect();
    }

    fn schedule(&mut self, event: TimerEvent, delay_ms: u64, now_ms: u64) -> TimerId {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        self.arm(id, event, delay_ms, now_ms);
        id
    }

    fn arm(&mut self, id: TimerId, event: TimerEvent, delay_ms: u64, now_ms: u64) {
        let due_ms = now_ms.saturating_add(delay_ms);
        let frozen = self.state == RunState::Paused
            && self.pause_mode() == PauseMode::Preserve
            && event != TimerEvent::Deadline;
        self.timers.insert(
            id,
            Timer {
                event,
                due_ms,
                delay_ms,
                remaining_ms: frozen.then_some(delay_ms),
            },
        );
        if !frozen {
            self.queue.push(Reverse((due_ms, id)));
        }
    }

    fn fire_timer(&mut self, id: TimerId, at_ms: u64) {
        let Some(timer) = self.timers.remove(&id) else {
            return;
        };
        match (self.state, timer.event) {
            (RunState::Idle | RunState::Stopped, _) => {}
            (_, TimerEvent::Deadline) => {
                info!("run time limit reached, stopping");
                self.stop(at_ms);
            }
            (RunState::Paused, TimerEvent::Arrival) => {
                debug!("arrival skipped while paused");
                self.schedule_next_arrival(at_ms);
            }
            (RunState::Paused, TimerEvent::Advance(order_id)) => {
                debug!("transition deferred while paused order_id={}", order_id);
                self.arm(id, timer.event, timer.delay_ms, at_ms);
            }
            (RunState::Running, TimerEvent::Arrival) => {
                self.generate_order(at_ms);
                if self.state != RunState::Stopped {
                    self.schedule_next_arrival(at_ms);
                }
            }
            (RunState::Running, TimerEvent::Advance(order_id)) => {
                self.advance_order(order_id, at_ms);
            }
        }
    }

    fn schedule_next_arrival(&mut self, now_ms: u64) {
        let Some(config) = &self.config else {
            return;
        };
        let hour = self.clock.hour_at(now_ms);
        let base = random::next_arrival_delay(&mut self.rng, hour, config.arrival_rate);
        let delay = config.scale_ms(base);
        self.schedule(TimerEvent::Arrival, delay, now_ms);
    }

    fn kitchen_load(&self) -> usize {
        self.fleet.values().filter(|o| o.stage.is_kitchen()).count()
    }

    fn generate_order(&mut self, now_ms: u64) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if let Some(max) = config.max_order_count {
            if self.counters.orders_generated >= max {
                info!("order limit reached max_order_count={}, stopping", max);
                self.stop(now_ms);
                return;
            }
        }
        if let Some(capacity) = config.kitchen_capacity {
            let load = self.kitchen_load();
            if !self.entropy.should_admit_order(load, capacity) {
                self.counters.orders_rejected += 1;
                debug!("arrival turned away kitchen_load={} capacity={}", load, capacity);
                self.recompute_stats(now_ms);
                return;
            }
        }
        let menu = match self.catalog.list_available_items(CATALOG_LIMIT) {
            Ok(menu) if !menu.is_empty() => menu,
            Ok(_) => {
                warn!("catalog has no available items, skipping arrival");
                return;
            }
            Err(e) => {
                warn!("catalog lookup failed, skipping arrival error={}", e);
                return;
            }
        };
        let id = OrderId(self.next_order_id);
        let Some(order) = order_gen::build_order(&mut self.rng, id, &menu, now_ms) else {
            return;
        };
        self.next_order_id += 1;
        self.counters.orders_generated += 1;
        info!(
            "order generated order_id={} items={} total={} table={:?}",
            id,
            order.items.len(),
            order.total,
            order.table_number
        );
        self.outbox.push(MirrorCommand::CreateOrder {
            order_id: id,
            record: OrderRecord {
                simulated_order_id: id,
                customer_name: order.customer.name.clone(),
                table_number: order.table_number,
                total: order.total,
                status: order.stage.external_status(),
                created_at_ms: now_ms,
            },
            items: order.items.clone(),
        });
        self.fleet.insert(id, order);
        self.schedule(
            TimerEvent::Advance(id),
            config.scale_ms(Stage::Arrival.base_duration_ms()),
            now_ms,
        );
        self.recompute_stats(now_ms);
    }

    fn dwell_ms(&mut self, stage: Stage, item_count: u32, randomized: bool) -> u64 {
        match stage {
            Stage::Cooking if randomized => random::cooking_duration(&mut self.rng, item_count),
            Stage::Dining if randomized => random::dining_duration(&mut self.rng),
            _ => stage.base_duration_ms(),
        }
    }

    fn advance_order(&mut self, id: OrderId, now_ms: u64) {
        let Some(config) = self.config.clone() else {
            return;
        };
        let Some(order) = self.fleet.get_mut(&id) else {
            return;
        };
        let from = order.stage;
        let Some(next) = from.next() else {
            self.fleet.remove(&id);
            self.counters.orders_completed += 1;
            self.journal(StageTransition {
                order_id: id,
                from,
                to: None,
                at_ms: now_ms,
            });
            info!("order completed order_id={}", id);
            self.recompute_stats(now_ms);
            return;
        };
        order.stage = next;
        order.stage_entered_ms = now_ms;
        let external_id = order.external_order_id.clone();
        let item_count = order.items.len() as u32;
        let total = order.total;
        let recognize_revenue = next == Stage::Payment && !order.revenue_recognized;
        if recognize_revenue {
            order.revenue_recognized = true;
        }

        let dwell = self.dwell_ms(next, item_count, config.randomized_dwell);
        self.schedule(TimerEvent::Advance(id), config.scale_ms(dwell), now_ms);

        if let Some(external_id) = &external_id {
            self.outbox.push(MirrorCommand::UpdateStatus {
                order_id: id,
                external_id: external_id.clone(),
                status: next.external_status(),
            });
        }
        if recognize_revenue {
            self.counters.revenue += total;
            if let Some(external_id) = external_id {
                let method = order_gen::draw_payment_method(&mut self.rng);
                self.outbox.push(MirrorCommand::CreatePayment {
                    order_id: id,
                    external_id,
                    method,
                    amount: total,
                });
            }
        }
        self.journal(StageTransition {
            order_id: id,
            from,
            to: Some(next),
            at_ms: now_ms,
        });
        debug!("order advanced order_id={} from={:?} to={:?}", id, from, next);
        self.recompute_stats(now_ms);
    }

    fn journal(&mut self, transition: StageTransition) {
        if self.transitions.len() == JOURNAL_CAPACITY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    fn recompute_stats(&mut self, now_ms: u64) {
        let hour = self.clock.hour_at(now_ms);
        self.stats = stats::compute(self.fleet.values(), self.state, &self.counters, now_ms, hour);
    }
}
