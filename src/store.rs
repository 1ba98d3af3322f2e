//! Collaborator contracts: the external order store and the menu catalog.
//!
//! The engine never calls the store directly; the mirror worker does. Both
//! traits return `String` errors, which are logged and absorbed by callers.
//! [`InMemoryOrderStore`] and [`StaticMenu`] back the demo binary and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::stage::ExternalStatus;
use crate::types::{ExternalOrderId, MenuItem, OrderId, OrderItem, PaymentMethod};

/// Metadata sent when a simulated order is first mirrored.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct OrderRecord {
    pub simulated_order_id: OrderId,
    pub customer_name: String,
    pub table_number: Option<u32>,
    pub total: Decimal,
    pub status: ExternalStatus,
    pub created_at_ms: u64,
}

/// Persistent order/item/payment store.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: &OrderRecord) -> Result<ExternalOrderId, String>;

    async fn create_order_items(&self, id: &ExternalOrderId, items: &[OrderItem]) -> Result<(), String>;

    async fn update_order_status(&self, id: &ExternalOrderId, status: ExternalStatus) -> Result<(), String>;

    async fn create_payment(&self, id: &ExternalOrderId, method: PaymentMethod, amount: Decimal) -> Result<(), String>;
}

/// Read-only menu lookup, queried once per order-generation cycle.
pub trait MenuCatalog: Send + Sync {
    /// Up to `limit` currently available items.
    fn list_available_items(&self, limit: usize) -> Result<Vec<MenuItem>, String>;
}

/// A mirrored order as held by [`InMemoryOrderStore`].
#[derive(Clone, Debug, serde::Serialize)]
pub struct StoredOrder {
    pub record: OrderRecord,
    pub status: ExternalStatus,
    pub items: Vec<OrderItem>,
    pub status_history: Vec<ExternalStatus>,
}

/// A mirrored payment as held by [`InMemoryOrderStore`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StoredPayment {
    pub order_id: ExternalOrderId,
    pub method: PaymentMethod,
    pub amount: Decimal,
}

#[derive(Default)]
struct StoreData {
    orders: HashMap<ExternalOrderId, StoredOrder>,
    payments: Vec<StoredPayment>,
}

/// Process-local order store with optional latency and failure injection.
#[derive(Default)]
pub struct InMemoryOrderStore {
    data: Mutex<StoreData>,
    next_id: AtomicU64,
    latency_ms: AtomicU64,
    fail_writes: AtomicBool,
    /// Number of upcoming writes that fail before writes succeed again.
    fail_next: AtomicUsize,
    calls: AtomicU64,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Release);
        self
    }

    /// Makes every write fail while `fail` is set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Makes the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next.store(n, Ordering::Release);
    }

    /// Total calls received, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }

    pub fn order(&self, id: &ExternalOrderId) -> Option<StoredOrder> {
        self.lock().orders.get(id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn find_by_simulated_id(&self, id: OrderId) -> Option<(ExternalOrderId, StoredOrder)> {
        self.lock()
            .orders
            .iter()
            .find(|(_, o)| o.record.simulated_order_id == id)
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn payments(&self) -> Vec<StoredPayment> {
        self.lock().payments.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn before_write(&self, op: &str) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let latency = self.latency_ms.load(Ordering::Acquire);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(format!("{}: store unavailable", op));
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(format!("{}: injected failure", op));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: &OrderRecord) -> Result<ExternalOrderId, String> {
        self.before_write("create_order").await?;
        let n = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        let id = ExternalOrderId(format!("ord-{}", n));
        self.lock().orders.insert(
            id.clone(),
            StoredOrder {
                record: order.clone(),
                status: order.status,
                items: Vec::new(),
                status_history: vec![order.status],
            },
        );
        Ok(id)
    }

    async fn create_order_items(&self, id: &ExternalOrderId, items: &[OrderItem]) -> Result<(), String> {
        self.before_write("create_order_items").await?;
        let mut data = self.lock();
        let order = data
            .orders
            .get_mut(id)
            .ok_or_else(|| format!("order {} not found", id))?;
        order.items.extend_from_slice(items);
        Ok(())
    }

    async fn update_order_status(&self, id: &ExternalOrderId, status: ExternalStatus) -> Result<(), String> {
        self.before_write("update_order_status").await?;
        let mut data = self.lock();
        let order = data
            .orders
            .get_mut(id)
            .ok_or_else(|| format!("order {} not found", id))?;
        order.status = status;
        order.status_history.push(status);
        Ok(())
    }

    async fn create_payment(&self, id: &ExternalOrderId, method: PaymentMethod, amount: Decimal) -> Result<(), String> {
        self.before_write("create_payment").await?;
        let mut data = self.lock();
        if !data.orders.contains_key(id) {
            return Err(format!("order {} not found", id));
        }
        data.payments.push(StoredPayment {
            order_id: id.clone(),
            method,
            amount,
        });
        Ok(())
    }
}

/// Fixed menu held in memory.
#[derive(Clone, Debug)]
pub struct StaticMenu {
    items: Vec<MenuItem>,
}

impl StaticMenu {
    pub fn new(items: Vec<MenuItem>) -> Self {
        Self { items }
    }

    /// Twelve-dish demo menu.
    pub fn default_menu() -> Self {
        let dishes: [(&str, i64); 12] = [
            ("Margherita Pizza", 1150),
            ("Caesar Salad", 850),
            ("Beef Burger", 1290),
            ("Chicken Curry", 1375),
            ("Pad Thai", 1225),
            ("Fish and Chips", 1400),
            ("Mushroom Risotto", 1310),
            ("Club Sandwich", 950),
            ("Tomato Soup", 600),
            ("Lemonade", 350),
            ("Espresso", 250),
            ("Cheesecake", 700),
        ];
        let items = dishes
            .iter()
            .enumerate()
            .map(|(i, (name, cents))| MenuItem {
                id: i as u64 + 1,
                name: (*name).to_string(),
                price: Decimal::new(*cents, 2),
            })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }
}

impl MenuCatalog for StaticMenu {
    fn list_available_items(&self, limit: usize) -> Result<Vec<MenuItem>, String> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}
