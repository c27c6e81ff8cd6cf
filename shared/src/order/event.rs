//! Order change events broadcast to observers
//!
//! Every store mutation produces exactly one event carrying a full,
//! self-contained snapshot of the affected order (never a diff), so every
//! consumer can apply a last-write-wins merge by order id without tracking
//! partial update history. `sequence` is the store commit counter: within a
//! single order, events are delivered in sequence order.

use super::types::Order;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event kind; new orders and status updates are distinct on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventKind {
    NewOrder,
    OrderUpdated,
}

/// A single order mutation, as fanned out to all observers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEvent {
    /// Unique event id (deduplication handle for observers)
    pub event_id: Uuid,
    /// Store commit sequence at which this mutation was applied
    pub sequence: u64,
    pub kind: OrderEventKind,
    /// Copied from the order for cheap table-channel filtering
    pub table_number: String,
    /// Full snapshot of the order after the mutation
    pub order: Order,
    /// Server timestamp (epoch millis)
    pub timestamp: i64,
}

impl OrderEvent {
    fn new(kind: OrderEventKind, sequence: u64, order: Order) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            sequence,
            kind,
            table_number: order.table_number.clone(),
            order,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Event for a freshly created order
    pub fn new_order(sequence: u64, order: Order) -> Self {
        Self::new(OrderEventKind::NewOrder, sequence, order)
    }

    /// Event for a status mutation on an existing order
    pub fn order_updated(sequence: u64, order: Order) -> Self {
        Self::new(OrderEventKind::OrderUpdated, sequence, order)
    }
}
