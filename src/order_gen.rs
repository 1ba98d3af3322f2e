//! Synthetic order construction.
//!
//! Builds one order from a menu: random identity, a weighted item count,
//! distinct dishes with quantity 1–2, the total, and an optional table.
//! [`Generator`] wraps the same routine into a deterministic stream for
//! benches and replay tests. Same seed and menu ⇒ same orders.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::random::{self, SeededLcg};
use crate::stage::Stage;
use crate::types::{Customer, MenuItem, OrderId, OrderItem, PaymentMethod, SimulatedOrder};

/// Maximum number of catalog entries requested per generation cycle.
pub const CATALOG_LIMIT: usize = 20;

/// Possible line counts per order and their weights.
pub const ITEM_COUNTS: [u32; 4] = [1, 2, 3, 4];
pub const ITEM_COUNT_WEIGHTS: [f64; 4] = [0.2, 0.4, 0.3, 0.1];

const DINE_IN_RATIO: f64 = 0.8;
const TABLE_COUNT: u32 = 20;
const PAYMENT_WEIGHTS: [f64; 3] = [0.6, 0.3, 0.1];

/// Number of lines for a new order (1–4, weighted 0.2/0.4/0.3/0.1).
pub fn draw_item_count<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    random::weighted_choice(rng, &ITEM_COUNTS, &ITEM_COUNT_WEIGHTS)
        .copied()
        .unwrap_or(1)
}

/// Picks `count` distinct dishes (fewer if the menu is short), each with quantity 1–2.
pub fn draw_items<R: Rng + ?Sized>(rng: &mut R, menu: &[MenuItem], count: u32) -> Vec<OrderItem> {
    menu.choose_multiple(rng, count as usize)
        .map(|item| OrderItem {
            menu_item_id: item.id,
            name: item.name.clone(),
            quantity: rng.gen_range(1..=2),
            unit_price: item.price,
        })
        .collect()
}

pub fn order_total(items: &[OrderItem]) -> Decimal {
    items.iter().map(OrderItem::line_total).sum()
}

/// Table 1–20 for dine-in guests (80 %), `None` for takeaway.
pub fn draw_table_number<R: Rng + ?Sized>(rng: &mut R) -> Option<u32> {
    if rng.gen_bool(DINE_IN_RATIO) {
        Some(rng.gen_range(1..=TABLE_COUNT))
    } else {
        None
    }
}

pub fn draw_payment_method<R: Rng + ?Sized>(rng: &mut R) -> PaymentMethod {
    random::weighted_choice(rng, &PaymentMethod::ALL, &PAYMENT_WEIGHTS)
        .copied()
        .unwrap_or(PaymentMethod::Card)
}

/// Builds a new order at stage `arrival`. Returns `None` if the menu is empty.
pub fn build_order<R: Rng + ?Sized>(rng: &mut R, id: OrderId, menu: &[MenuItem], now_ms: u64) -> Option<SimulatedOrder> {
    if menu.is_empty() {
        return None;
    }
    let customer = Customer {
        name: random::customer_name(rng),
        avatar: random::avatar_glyph(rng),
    };
    let count = draw_item_count(rng);
    let items = draw_items(rng, menu, count);
    let total = order_total(&items);
    let table_number = draw_table_number(rng);
    Some(SimulatedOrder {
        id,
        external_order_id: None,
        stage: Stage::Arrival,
        start_time_ms: now_ms,
        stage_entered_ms: now_ms,
        customer,
        items,
        total,
        table_number,
        revenue_recognized: false,
    })
}

/// Deterministic order stream over a fixed menu.
pub struct Generator {
    rng: SeededLcg,
    menu: Vec<MenuItem>,
    next_order_id: u64,
    next_timestamp: u64,
}

impl Generator {
    pub fn new(seed: u64, menu: Vec<MenuItem>) -> Self {
        Self {
            rng: SeededLcg::seed_from_u64(seed),
            menu,
            next_order_id: 1,
            next_timestamp: 1,
        }
    }

    /// Next order, or `None` if the menu is empty.
    pub fn next_order(&mut self) -> Option<SimulatedOrder> {
        let order = build_order(
            &mut self.rng,
            OrderId(self.next_order_id),
            &self.menu,
            self.next_timestamp,
        )?;
        self.next_order_id += 1;
        self.next_timestamp += 1;
        Some(order)
    }

    pub fn take_orders(&mut self, n: usize) -> Vec<SimulatedOrder> {
        (0..n).map_while(|_| self.next_order()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticMenu;

    fn menu() -> Vec<MenuItem> {
        StaticMenu::default_menu().items().to_vec()
    }

    #[test]
    fn same_seed_same_stream() {
        let a = Generator::new(42, menu()).take_orders(10);
        let b = Generator::new(42, menu()).take_orders(10);
        assert_eq!(a.len(), 10);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.customer, y.customer);
            assert_eq!(x.items, y.items);
            assert_eq!(x.total, y.total);
            assert_eq!(x.table_number, y.table_number);
        }
    }

    #[test]
    fn different_seed_different_stream() {
        let a = Generator::new(1, menu()).take_orders(5);
        let b = Generator::new(2, menu()).take_orders(5);
        let identical = a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| x.items == y.items && x.customer == y.customer);
        assert!(!identical, "different seeds should produce different orders");
    }

    #[test]
    fn orders_are_well_formed() {
        for order in Generator::new(7, menu()).take_orders(200) {
            assert_eq!(order.stage, Stage::Arrival);
            assert!((1..=4).contains(&order.items.len()));
            assert!(order.items.iter().all(|i| (1..=2).contains(&i.quantity)));
            assert_eq!(order.total, order_total(&order.items));
            assert!(order.total > Decimal::ZERO);
            if let Some(table) = order.table_number {
                assert!((1..=TABLE_COUNT).contains(&table));
            }
            let mut ids: Vec<u64> = order.items.iter().map(|i| i.menu_item_id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), order.items.len(), "dishes are distinct");
        }
    }

    #[test]
    fn short_menu_caps_item_count() {
        let short = menu().into_iter().take(1).collect::<Vec<_>>();
        for order in Generator::new(3, short).take_orders(50) {
            assert_eq!(order.items.len(), 1);
        }
    }

    #[test]
    fn empty_menu_yields_nothing() {
        assert!(Generator::new(3, Vec::new()).take_orders(5).is_empty());
    }
}
