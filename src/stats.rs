//! Fleet statistics.
//!
//! A snapshot is a pure function of the fleet, the run start time and the
//! run counters. Only the revenue accumulator carries state between snapshots.

use rust_decimal::Decimal;

use crate::random;
use crate::stage::Stage;
use crate::types::{RunState, SimulatedOrder};

const HOUR_MS: f64 = 3_600_000.0;

/// Aggregate view of the current run.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimulationStats {
    pub run_state: RunState,
    /// Orders currently in flight.
    pub active_orders: usize,
    /// Orders in `kitchen_queue` or `cooking`.
    pub in_kitchen: usize,
    /// Orders in `dining`.
    pub dining: usize,
    /// Revenue recognized at payment transitions since run start.
    pub revenue: Decimal,
    /// Orders generated per elapsed hour since run start.
    pub orders_per_hour: f64,
    pub is_peak_hour: bool,
    pub orders_generated: u64,
    pub orders_completed: u64,
    /// Arrivals turned away by admission control.
    pub orders_rejected: u64,
}

/// Run counters that feed a snapshot alongside the fleet.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunCounters {
    pub run_started_ms: Option<u64>,
    pub revenue: Decimal,
    pub orders_generated: u64,
    pub orders_completed: u64,
    pub orders_rejected: u64,
}

/// Builds a snapshot from the fleet at `now_ms`, where `hour` is the hour of day at `now_ms`.
pub fn compute<'a>(
    fleet: impl IntoIterator<Item = &'a SimulatedOrder>,
    run_state: RunState,
    counters: &RunCounters,
    now_ms: u64,
    hour: u32,
) -> SimulationStats {
    let mut active_orders = 0;
    let mut in_kitchen = 0;
    let mut dining = 0;
    for order in fleet {
        if !order.stage.is_active() {
            continue;
        }
        active_orders += 1;
        if order.stage.is_kitchen() {
            in_kitchen += 1;
        }
        if order.stage == Stage::Dining {
            dining += 1;
        }
    }
    let elapsed_ms = counters
        .run_started_ms
        .map(|start| now_ms.saturating_sub(start))
        .unwrap_or(0);
    let orders_per_hour = if elapsed_ms == 0 {
        0.0
    } else {
        counters.orders_generated as f64 / (elapsed_ms as f64 / HOUR_MS)
    };
    SimulationStats {
        run_state,
        active_orders,
        in_kitchen,
        dining,
        revenue: counters.revenue,
        orders_per_hour,
        is_peak_hour: random::is_peak_hour(hour),
        orders_generated: counters.orders_generated,
        orders_completed: counters.orders_completed,
        orders_rejected: counters.orders_rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Customer, OrderId};

    fn order(id: u64, stage: Stage) -> SimulatedOrder {
        SimulatedOrder {
            id: OrderId(id),
            external_order_id: None,
            stage,
            start_time_ms: 0,
            stage_entered_ms: 0,
            customer: Customer {
                name: "Test Guest".into(),
                avatar: "🧑".into(),
            },
            items: Vec::new(),
            total: Decimal::ZERO,
            table_number: None,
            revenue_recognized: false,
        }
    }

    #[test]
    fn counts_by_stage() {
        let fleet = vec![
            order(1, Stage::KitchenQueue),
            order(2, Stage::Cooking),
            order(3, Stage::Dining),
            order(4, Stage::Payment),
        ];
        let counters = RunCounters {
            run_started_ms: Some(0),
            revenue: Decimal::from(12),
            orders_generated: 4,
            ..Default::default()
        };
        let stats = compute(&fleet, RunState::Running, &counters, 2 * 3_600_000, 15);
        assert_eq!(stats.active_orders, 4);
        assert_eq!(stats.in_kitchen, 2);
        assert_eq!(stats.dining, 1);
        assert_eq!(stats.revenue, Decimal::from(12));
        assert!((stats.orders_per_hour - 2.0).abs() < 1e-9);
        assert!(!stats.is_peak_hour);
        assert_eq!(stats.run_state, RunState::Running);
    }

    #[test]
    fn zero_elapsed_time_gives_zero_rate() {
        let counters = RunCounters {
            run_started_ms: Some(1_000),
            orders_generated: 3,
            ..Default::default()
        };
        let stats = compute(&[], RunState::Paused, &counters, 1_000, 12);
        assert_eq!(stats.orders_per_hour, 0.0);
        assert!(stats.is_peak_hour);
        assert_eq!(stats.active_orders, 0);
        assert_eq!(stats.run_state, RunState::Paused);
    }
}
