//! Core types and IDs for the order lifecycle simulator.
//!
//! Identifiers are newtype wrappers. [`SimulatedOrder`] is the in-flight synthetic
//! order; [`SimulationConfig`] is the immutable input of one run.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::SimulationError;
use crate::stage::Stage;

/// Synthetic order identifier, assigned by the engine and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIM-{:06}", self.0)
    }
}

/// Identifier of the mirrored record in the external order store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ExternalOrderId(pub String);

impl fmt::Display for ExternalOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a scheduled engine timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TimerId(pub u64);

/// Cosmetic display identity of a synthetic customer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Customer {
    pub name: String,
    pub avatar: String,
}

/// One line of a simulated order.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderItem {
    pub menu_item_id: u64,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Menu entry as returned by the catalog collaborator.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MenuItem {
    pub id: u64,
    pub name: String,
    pub price: Decimal,
}

/// A synthetic order in flight.
///
/// Created by order generation, mutated only by stage transitions, removed after
/// `invoice` or when the run stops. Consumers only ever see clones.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SimulatedOrder {
    pub id: OrderId,
    pub external_order_id: Option<ExternalOrderId>,
    pub stage: Stage,
    pub start_time_ms: u64,
    pub stage_entered_ms: u64,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub table_number: Option<u32>,
    #[serde(skip)]
    pub(crate) revenue_recognized: bool,
}

impl SimulatedOrder {
    /// Total number of units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_dine_in(&self) -> bool {
        self.table_number.is_some()
    }
}

/// Arrival intensity tier. Each maps to a base orders-per-hour figure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalRate {
    Low,
    #[default]
    Medium,
    High,
    Rush,
}

impl ArrivalRate {
    pub const ALL: [ArrivalRate; 4] = [ArrivalRate::Low, ArrivalRate::Medium, ArrivalRate::High, ArrivalRate::Rush];

    pub fn base_orders_per_hour(self) -> f64 {
        match self {
            ArrivalRate::Low => 5.0,
            ArrivalRate::Medium => 15.0,
            ArrivalRate::High => 30.0,
            ArrivalRate::Rush => 50.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArrivalRate::Low => "low",
            ArrivalRate::Medium => "medium",
            ArrivalRate::High => "high",
            ArrivalRate::Rush => "rush",
        }
    }
}

impl FromStr for ArrivalRate {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArrivalRate::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SimulationError::UnknownArrivalRate(s.to_string()))
    }
}

/// What happens to pending timers while the run is paused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseMode {
    /// Timers keep firing and their effects are discarded. Paused time is lost:
    /// a stage timer re-arms with its full delay, and the first fire after
    /// resume advances the order by one stage.
    #[default]
    Discard,
    /// Timers are frozen on pause and rescheduled on resume with exactly the
    /// delay that was remaining.
    Preserve,
}

impl FromStr for PauseMode {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(PauseMode::Discard),
            "preserve" => Ok(PauseMode::Preserve),
            _ => Err(SimulationError::UnknownPauseMode(s.to_string())),
        }
    }
}

/// Payment method recorded when an order reaches the payment stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
    Mobile,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [PaymentMethod::Card, PaymentMethod::Cash, PaymentMethod::Mobile];
}

/// Engine run state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Immutable input of one simulation run.
///
/// Deserializes from JSON with every field except `speed` and `arrival_rate` optional.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimulationConfig {
    /// Playback multiplier; all simulated delays are divided by it. Must be positive.
    pub speed: f64,
    pub arrival_rate: ArrivalRate,
    /// Stop the run once this many orders have been generated.
    #[serde(default)]
    pub max_order_count: Option<u64>,
    /// Stop the run this many wall-clock minutes after start (not speed scaled).
    #[serde(default)]
    pub max_duration_minutes: Option<u64>,
    #[serde(default)]
    pub pause_mode: PauseMode,
    /// Sample cooking and dining dwell times instead of using the fixed table.
    #[serde(default)]
    pub randomized_dwell: bool,
    /// Enables load-aware admission of new orders against this kitchen capacity.
    #[serde(default)]
    pub kitchen_capacity: Option<usize>,
}

impl SimulationConfig {
    /// Speed presets offered by the host configuration surface.
    pub const SPEED_PRESETS: [f64; 4] = [1.0, 2.0, 5.0, 10.0];

    pub fn new(speed: f64, arrival_rate: ArrivalRate) -> Self {
        Self {
            speed,
            arrival_rate,
            ..Default::default()
        }
    }

    /// Scales a base delay by the speed multiplier. Never returns zero.
    pub fn scale_ms(&self, base_ms: u64) -> u64 {
        let scaled = (base_ms as f64 / self.speed).round();
        if scaled.is_finite() && scaled >= 1.0 {
            scaled as u64
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(SimulationError::InvalidSpeed(self.speed));
        }
        if self.kitchen_capacity == Some(0) {
            return Err(SimulationError::InvalidCapacity);
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            arrival_rate: ArrivalRate::Medium,
            max_order_count: None,
            max_duration_minutes: None,
            pause_mode: PauseMode::Discard,
            randomized_dwell: false,
            kitchen_capacity: None,
        }
    }
}

/// One recorded stage change. `to == None` records removal after the terminal stage.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StageTransition {
    pub order_id: OrderId,
    pub from: Stage,
    pub to: Option<Stage>,
    pub at_ms: u64,
}
