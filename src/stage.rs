//! Fulfillment pipeline stages.
//!
//! Twelve stages in a strict total order. Every non-terminal stage has exactly
//! one successor, a base dwell duration, and a status in the external store's
//! vocabulary. `Invoice` is terminal.

use std::fmt;

/// Status vocabulary of the external order store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalStatus {
    Pending,
    Preparing,
    Done,
    Completed,
}

impl ExternalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExternalStatus::Pending => "pending",
            ExternalStatus::Preparing => "preparing",
            ExternalStatus::Done => "done",
            ExternalStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ExternalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage of a simulated order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Arrival,
    Placement,
    KitchenQueue,
    Cooking,
    Ready,
    Serving,
    Dining,
    Drinks,
    HandWashing,
    Clearing,
    Payment,
    Invoice,
}

/// Display configuration of one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct StageConfig {
    pub label: &'static str,
    pub duration_ms: u64,
    pub description: &'static str,
}

impl Stage {
    /// All stages in canonical order.
    pub const ALL: [Stage; 12] = [
        Stage::Arrival,
        Stage::Placement,
        Stage::KitchenQueue,
        Stage::Cooking,
        Stage::Ready,
        Stage::Serving,
        Stage::Dining,
        Stage::Drinks,
        Stage::HandWashing,
        Stage::Clearing,
        Stage::Payment,
        Stage::Invoice,
    ];

    /// Position in the canonical order (0-based).
    pub fn index(self) -> usize {
        self as usize
    }

    /// The successor stage, or `None` for `Invoice`.
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Every stage counts as active; orders leave the fleet by removal only.
    pub fn is_active(self) -> bool {
        true
    }

    /// Active stages in canonical order.
    pub fn active_in_order() -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(|s| s.is_active())
    }

    /// Dwell time in this stage at speed 1, in milliseconds.
    pub fn base_duration_ms(self) -> u64 {
        match self {
            Stage::Arrival => 2_000,
            Stage::Placement => 3_000,
            Stage::KitchenQueue => 5_000,
            Stage::Cooking => 15_000,
            Stage::Ready => 3_000,
            Stage::Serving => 5_000,
            Stage::Dining => 20_000,
            Stage::Drinks => 5_000,
            Stage::HandWashing => 3_000,
            Stage::Clearing => 4_000,
            Stage::Payment => 5_000,
            Stage::Invoice => 2_000,
        }
    }

    pub fn external_status(self) -> ExternalStatus {
        match self {
            Stage::Arrival | Stage::Placement | Stage::KitchenQueue => ExternalStatus::Pending,
            Stage::Cooking => ExternalStatus::Preparing,
            Stage::Ready | Stage::Serving => ExternalStatus::Done,
            Stage::Dining
            | Stage::Drinks
            | Stage::HandWashing
            | Stage::Clearing
            | Stage::Payment
            | Stage::Invoice => ExternalStatus::Completed,
        }
    }

    /// Orders in these stages count as kitchen load.
    pub fn is_kitchen(self) -> bool {
        matches!(self, Stage::KitchenQueue | Stage::Cooking)
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Arrival => "Arrival",
            Stage::Placement => "Order placed",
            Stage::KitchenQueue => "Kitchen queue",
            Stage::Cooking => "Cooking",
            Stage::Ready => "Ready",
            Stage::Serving => "Serving",
            Stage::Dining => "Dining",
            Stage::Drinks => "Drinks",
            Stage::HandWashing => "Hand washing",
            Stage::Clearing => "Clearing table",
            Stage::Payment => "Payment",
            Stage::Invoice => "Invoice",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::Arrival => "Customer walks in and is greeted",
            Stage::Placement => "Order is taken and entered at the till",
            Stage::KitchenQueue => "Ticket waits for a free station",
            Stage::Cooking => "Dishes are being prepared",
            Stage::Ready => "Dishes wait at the pass",
            Stage::Serving => "Dishes are carried to the customer",
            Stage::Dining => "Customer is eating",
            Stage::Drinks => "Drinks and dessert round",
            Stage::HandWashing => "Customer freshens up",
            Stage::Clearing => "Table is cleared",
            Stage::Payment => "Bill is settled",
            Stage::Invoice => "Invoice is issued",
        }
    }

    pub fn config(self) -> StageConfig {
        StageConfig {
            label: self.label(),
            duration_ms: self.base_duration_ms(),
            description: self.description(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
