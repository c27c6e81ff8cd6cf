//! redb-backed order store
//!
//! Current-state storage: every committed mutation overwrites the order's
//! full snapshot. Reads are served from an in-memory [`DashMap`] mirror that
//! is rebuilt from disk at startup.
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` (JSON) | Current order snapshots |
//! | `meta` | `"seq"` | `u64` | Monotonic event sequence |
//!
//! # Ordering guarantee
//!
//! A mutation holds the order's map entry lock across persist, sequence
//! assignment and broadcast. Two commits on the *same* order can therefore
//! never publish out of order. Nothing is guaranteed across different
//! orders, and consumers must not assume it.
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: once `commit()` returns the
//! snapshot survives power loss, and the database file is always in a
//! consistent state (copy-on-write with atomic pointer swap).

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::{LifecycleError, Order, OrderEvent};
use thiserror::Error;
use tokio::sync::broadcast;

/// Current order snapshots: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Store metadata: key = "seq", value = u64
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQUENCE_KEY: &str = "seq";

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        LifecycleError::Storage(err.to_string())
    }
}

/// In-memory order map with write-through redb persistence
pub struct OrderStore {
    db: Arc<Database>,
    orders: DashMap<String, Order>,
    event_tx: broadcast::Sender<OrderEvent>,
}

impl OrderStore {
    /// Open the store on an existing database, reloading all orders
    pub fn open(db: Arc<Database>, event_buffer: usize) -> StoreResult<Self> {
        // Make sure both tables exist before the first read
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let mut meta = write_txn.open_table(META_TABLE)?;
            if meta.get(SEQUENCE_KEY)?.is_none() {
                meta.insert(SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        let orders = DashMap::new();
        let read_txn = db.begin_read()?;
        {
            let table = read_txn.open_table(ORDERS_TABLE)?;
            for entry in table.iter()? {
                let (key, value) = entry?;
                let order: Order = serde_json::from_slice(value.value())?;
                orders.insert(key.value().to_string(), order);
            }
        }

        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        tracing::info!("📦 Order store opened with {} order(s)", orders.len());

        Ok(Self {
            db,
            orders,
            event_tx,
        })
    }

    /// Subscribe to committed order events
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.event_tx.subscribe()
    }

    /// Fetch one order by id
    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).map(|entry| entry.value().clone())
    }

    /// All orders, oldest first
    pub fn all(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sort_fcfs(&mut orders);
        orders
    }

    /// All non-paid orders, oldest first
    pub fn active(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| !entry.value().is_paid())
            .map(|entry| entry.value().clone())
            .collect();
        sort_fcfs(&mut orders);
        orders
    }

    /// Number of stored orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// True when no orders are stored
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Last committed event sequence
    pub fn current_sequence(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;
        Ok(table
            .get(SEQUENCE_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    /// Commit a brand-new order and publish its `NEW_ORDER` event
    pub fn insert(&self, order: Order) -> Result<OrderEvent, LifecycleError> {
        match self.orders.entry(order.id.clone()) {
            Entry::Occupied(_) => Err(LifecycleError::Storage(format!(
                "duplicate order id {}",
                order.id
            ))),
            Entry::Vacant(entry) => {
                let sequence = self.persist(&order)?;
                let event = OrderEvent::new_order(sequence, order.clone());
                entry.insert(order);
                // Published while the entry lock is still held
                let _ = self.event_tx.send(event.clone());
                Ok(event)
            }
        }
    }

    /// Apply a validated mutation to one order
    ///
    /// The closure receives a draft copy and reports the outcome:
    /// - `Ok(true)` — changed: persist, assign a sequence, publish
    ///   `ORDER_UPDATED`, and return the event.
    /// - `Ok(false)` — idempotent no-op: nothing persisted, no event,
    ///   returns `None`.
    /// - `Err(_)` — rejected: the stored order is left untouched.
    ///
    /// The entry lock is held from lookup to publish, so concurrent
    /// mutations of one order serialize and their events keep commit order.
    pub fn update_with<F>(
        &self,
        order_id: &str,
        mutate: F,
    ) -> Result<Option<OrderEvent>, LifecycleError>
    where
        F: FnOnce(&mut Order) -> Result<bool, LifecycleError>,
    {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("order {order_id} not found")))?;

        let mut draft = entry.value().clone();
        if !mutate(&mut draft)? {
            return Ok(None);
        }

        let sequence = self.persist(&draft)?;
        let event = OrderEvent::order_updated(sequence, draft.clone());
        *entry.value_mut() = draft;
        // Published while the entry lock is still held
        let _ = self.event_tx.send(event.clone());
        Ok(Some(event))
    }

    /// Write the order snapshot and bump the sequence in one transaction
    fn persist(&self, order: &Order) -> StoreResult<u64> {
        let bytes = serde_json::to_vec(order)?;
        let write_txn = self.db.begin_write()?;
        let sequence;
        {
            let mut orders = write_txn.open_table(ORDERS_TABLE)?;
            orders.insert(order.id.as_str(), bytes.as_slice())?;

            let mut meta = write_txn.open_table(META_TABLE)?;
            let current = meta
                .get(SEQUENCE_KEY)?
                .map(|guard| guard.value())
                .unwrap_or(0);
            sequence = current + 1;
            meta.insert(SEQUENCE_KEY, sequence)?;
        }
        write_txn.commit()?;
        Ok(sequence)
    }
}

fn sort_fcfs(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
