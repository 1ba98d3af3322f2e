//! # Order Lifecycle Simulator
//!
//! Generates synthetic restaurant orders and walks each one through a fixed
//! twelve-stage lifecycle (arrival to invoice) on speed-scaled timers, with
//! Poisson arrivals shaped by time-of-day rush windows. Orders are mirrored
//! best-effort into an external store; live statistics are kept alongside.
//!
//! ## Entry point
//!
//! [`Engine`] is the deterministic core: create it with [`Engine::with_seed`],
//! call [`Engine::start`], then let time pass with [`Engine::advance_to`].
//! [`SimulationHandle`] drives an engine in real time on tokio and feeds its
//! mirror writes to an [`OrderStore`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use order_lifecycle_sim::{ArrivalRate, Clock, Engine, ManualClock, SimulationConfig, StaticMenu};
//!
//! let clock = Arc::new(ManualClock::at_hour(12));
//! let start = clock.now_ms();
//! let mut engine = Engine::with_seed(Arc::new(StaticMenu::default_menu()), clock, 7);
//! engine.start(SimulationConfig::new(10.0, ArrivalRate::Rush), start).unwrap();
//! engine.advance_to(start + 10 * 60_000);
//!
//! let stats = engine.stats();
//! assert!(stats.orders_generated > 0);
//! assert!(stats.is_peak_hour);
//! assert!(!engine.take_mirror_commands().is_empty());
//! ```
//!
//! ## Lower-level API
//!
//! The sampling functions in [`random`], the admission and pricing heuristics in
//! [`entropy`], and [`order_gen::Generator`] can be used on their own.

pub mod api;
pub mod clock;
pub mod dead_letter;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod mirror;
pub mod order_gen;
pub mod random;
pub mod runner;
pub mod stage;
pub mod stats;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dead_letter::{DeadLetter, DeadLetterSink, InMemoryDeadLetterSink, LogDeadLetterSink};
pub use engine::{Engine, PendingTimer, TimerEvent, JOURNAL_CAPACITY};
pub use entropy::{DayPart, EntropyPool};
pub use error::SimulationError;
pub use mirror::{spawn_mirror, Mirror, MirrorCommand, MirrorConfig};
pub use order_gen::Generator;
pub use random::SeededLcg;
pub use runner::{RunnerState, SimulationHandle};
pub use stage::{ExternalStatus, Stage};
pub use stats::SimulationStats;
pub use store::{InMemoryOrderStore, MenuCatalog, OrderRecord, OrderStore, StaticMenu};
pub use types::{
    ArrivalRate, Customer, ExternalOrderId, MenuItem, OrderId, OrderItem, PauseMode, PaymentMethod, RunState,
    SimulatedOrder, SimulationConfig, StageTransition, TimerId,
};
