//! Best-effort mirroring of simulated orders into the external store.
//!
//! The engine emits [`MirrorCommand`]s and never waits for them. Commands go
//! through a bounded queue to a worker that spreads orders over a fixed number
//! of lanes. Lanes run concurrently; within a lane, writes run one at a time in
//! submission order, so an order's status never moves backwards in the store.
//! Each write is retried a bounded number of times and what still fails goes
//! to the dead-letter sink. A full queue dead-letters the command instead of
//! blocking the engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future;
use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::stage::ExternalStatus;
use crate::store::{OrderRecord, OrderStore};
use crate::types::{ExternalOrderId, OrderId, OrderItem, PaymentMethod};

/// One write against the external store.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorCommand {
    /// Create the order record, then its items. The resulting external id is
    /// handed back to the engine.
    CreateOrder {
        order_id: OrderId,
        record: OrderRecord,
        items: Vec<OrderItem>,
    },
    UpdateStatus {
        order_id: OrderId,
        external_id: ExternalOrderId,
        status: ExternalStatus,
    },
    CreatePayment {
        order_id: OrderId,
        external_id: ExternalOrderId,
        method: PaymentMethod,
        amount: Decimal,
    },
}

impl MirrorCommand {
    pub fn order_id(&self) -> OrderId {
        match self {
            MirrorCommand::CreateOrder { order_id, .. }
            | MirrorCommand::UpdateStatus { order_id, .. }
            | MirrorCommand::CreatePayment { order_id, .. } => *order_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MirrorCommand::CreateOrder { .. } => "create_order",
            MirrorCommand::UpdateStatus { .. } => "update_status",
            MirrorCommand::CreatePayment { .. } => "create_payment",
        }
    }
}

/// Queue and retry limits of the mirror worker.
#[derive(Clone, Debug)]
pub struct MirrorConfig {
    /// Commands waiting for the worker; beyond this, commands are dead-lettered.
    pub queue_capacity: usize,
    /// Lanes, and so writes in flight at once. Writes for one order share a lane.
    pub max_in_flight: usize,
    /// Attempts per write, including the first.
    pub max_attempts: u32,
    /// Backoff before retry `n` is `n × retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_in_flight: 8,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Called with the external id once an order's record has been created.
pub type OnCreated = Arc<dyn Fn(OrderId, ExternalOrderId) + Send + Sync>;

/// Sending half of the mirror queue. Cheap to clone.
#[derive(Clone)]
pub struct Mirror {
    tx: mpsc::Sender<MirrorCommand>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl Mirror {
    /// Enqueues a command without waiting. Never blocks and never fails the caller.
    pub fn submit(&self, command: MirrorCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!(
                    "mirror queue full, dropping kind={} order_id={}",
                    command.kind(),
                    command.order_id()
                );
                self.dead_letters
                    .record(DeadLetter::now(command, 0, "mirror queue full"));
            }
            Err(TrySendError::Closed(command)) => {
                warn!(
                    "mirror worker stopped, dropping kind={} order_id={}",
                    command.kind(),
                    command.order_id()
                );
                self.dead_letters
                    .record(DeadLetter::now(command, 0, "mirror worker stopped"));
            }
        }
    }

    /// Commands currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Starts the mirror worker on the current tokio runtime.
///
/// The worker ends once every [`Mirror`] handle has been dropped and the queue
/// is drained.
pub fn spawn_mirror(
    store: Arc<dyn OrderStore>,
    config: MirrorConfig,
    dead_letters: Arc<dyn DeadLetterSink>,
    on_created: OnCreated,
) -> (Mirror, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let mirror = Mirror {
        tx,
        dead_letters: Arc::clone(&dead_letters),
    };
    let handle = tokio::spawn(run_worker(rx, store, config, dead_letters, on_created));
    (mirror, handle)
}

async fn run_worker(
    rx: mpsc::Receiver<MirrorCommand>,
    store: Arc<dyn OrderStore>,
    config: MirrorConfig,
    dead_letters: Arc<dyn DeadLetterSink>,
    on_created: OnCreated,
) {
    let lanes = config.max_in_flight.max(1);
    let lane_capacity = (config.queue_capacity / lanes).max(1);
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..lanes)
        .map(|_| mpsc::channel::<MirrorCommand>(lane_capacity))
        .unzip();

    // Every write for one order goes to the same lane, so they apply in submission order.
    let dispatch_dead_letters = Arc::clone(&dead_letters);
    let dispatch = async move {
        let mut rx = rx;
        while let Some(command) = rx.recv().await {
            let lane = lane_of(command.order_id(), lanes);
            if let Err(mpsc::error::SendError(command)) = senders[lane].send(command).await {
                dispatch_dead_letters.record(DeadLetter::now(command, 0, "mirror lane stopped"));
            }
        }
    };

    let drain: std::pin::Pin<Box<dyn Future<Output = ()> + Send + '_>> = Box::pin(stream::iter(receivers).for_each_concurrent(None, |lane_rx| {
        let store = Arc::clone(&store);
        let config = config.clone();
        let dead_letters = Arc::clone(&dead_letters);
        let on_created = Arc::clone(&on_created);
        async move {
            let mut commands = stream::unfold(lane_rx, |mut rx| async move {
                rx.recv().await.map(|command| (command, rx))
            })
            .boxed();
            while let Some(command) = commands.next().await {
                apply(command, store.as_ref(), &config, dead_letters.as_ref(), on_created.as_ref()).await;
            }
        }
    }));

    future::join(dispatch, drain).await;
    debug!("mirror worker stopped");
}

fn lane_of(order_id: OrderId, lanes: usize) -> usize {
    (order_id.0 % lanes as u64) as usize
}

async fn apply(
    command: MirrorCommand,
    store: &dyn OrderStore,
    config: &MirrorConfig,
    dead_letters: &dyn DeadLetterSink,
    on_created: &(dyn Fn(OrderId, ExternalOrderId) + Send + Sync),
) {
    let outcome = match &command {
        MirrorCommand::CreateOrder {
            order_id,
            record,
            items,
        } => match with_retry(config, "create_order", move || store.create_order(record)).await {
            Ok(external_id) => {
                info!("mirror created order_id={} external_id={}", order_id, external_id);
                on_created(*order_id, external_id.clone());
                if items.is_empty() {
                    Ok(())
                } else {
                    let id = &external_id;
                    with_retry(config, "create_order_items", move || store.create_order_items(id, items)).await
                }
            }
            Err(failure) => Err(failure),
        },
        MirrorCommand::UpdateStatus {
            external_id, status, ..
        } => {
            let status = *status;
            with_retry(config, "update_order_status", move || {
                store.update_order_status(external_id, status)
            })
            .await
        }
        MirrorCommand::CreatePayment {
            external_id,
            method,
            amount,
            ..
        } => {
            let (method, amount) = (*method, *amount);
            with_retry(config, "create_payment", move || {
                store.create_payment(external_id, method, amount)
            })
            .await
        }
    };
    if let Err((attempts, error)) = outcome {
        dead_letters.record(DeadLetter::now(command, attempts, error));
    }
}

async fn with_retry<T, F, Fut>(config: &MirrorConfig, op: &str, mut call: F) -> Result<T, (u32, String)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= max_attempts => {
                warn!("mirror write failed op={} attempts={} error={}", op, attempt, error);
                return Err((attempt, error));
            }
            Err(error) => {
                debug!("mirror retry op={} attempt={} error={}", op, attempt, error);
                tokio::time::sleep(config.retry_backoff * attempt).await;
            }
        }
    }
}
