//! Order and item model
//!
//! An order is immutable in its item list and price after creation; only
//! status fields mutate. Order-level status is derived from item statuses,
//! except for the explicit `PAID` close which is sticky once applied.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Default category name that selects the drink preparation track.
pub const DEFAULT_DRINK_CATEGORY: &str = "Minuman";

/// Per-item lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[default]
    Pending,
    Cooking,
    Served,
}

/// Order-level status, derived from item statuses plus the explicit close
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Cooking,
    Served,
    Paid,
}

impl OrderStatus {
    /// Next stage in the coarse order sequence, `None` from `PAID`
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Cooking),
            OrderStatus::Cooking => Some(OrderStatus::Served),
            OrderStatus::Served => Some(OrderStatus::Paid),
            OrderStatus::Paid => None,
        }
    }
}

/// Preparation track an item advances through
///
/// Drinks skip the cooking stage; there is no intermediate preparation
/// tracked for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Food,
    Drink,
}

impl Track {
    /// Track for a category name given the configured drink category
    pub fn for_category(category: &str, drink_category: &str) -> Self {
        if category == drink_category {
            Track::Drink
        } else {
            Track::Food
        }
    }

    /// Stage sequence of this track
    pub fn stages(self) -> &'static [ItemStatus] {
        match self {
            Track::Food => &[ItemStatus::Pending, ItemStatus::Cooking, ItemStatus::Served],
            Track::Drink => &[ItemStatus::Pending, ItemStatus::Served],
        }
    }

    /// Next stage after `current`, `None` if terminal or off-track
    pub fn next_stage(self, current: ItemStatus) -> Option<ItemStatus> {
        let stages = self.stages();
        let idx = stages.iter().position(|s| *s == current)?;
        stages.get(idx + 1).copied()
    }
}

/// A line item, snapshotted from the menu catalog at order time
///
/// Catalog changes never retroactively alter placed orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    /// Unique within its order (assigned by the server)
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    /// Classification; the configured drink category selects the drink track
    pub category: String,
    /// Independent lifecycle state, initially `PENDING`
    #[serde(default)]
    pub status: ItemStatus,
}

impl OrderItem {
    /// Fresh item at `PENDING` with a server-assigned id
    pub fn new(
        name: impl Into<String>,
        quantity: u32,
        price: f64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            quantity,
            price,
            category: category.into(),
            status: ItemStatus::Pending,
        }
    }

    /// Track this item advances through
    pub fn track(&self, drink_category: &str) -> Track {
        Track::for_category(&self.category, drink_category)
    }

    /// `price * quantity`
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// An order placed from a table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Order ID (assigned by the server, immutable)
    pub id: String,
    /// Physical table this order was placed from
    pub table_number: String,
    /// Line items, insertion order preserved (= ordering order)
    pub items: Vec<OrderItem>,
    /// Sum of `item.price * item.quantity` at creation time, immutable
    pub total_price: f64,
    /// Derived order status (see [`derive_order_status`])
    #[serde(default)]
    pub status: OrderStatus,
    /// Creation timestamp (epoch millis); drives FCFS kitchen ordering
    pub created_at: i64,
    /// Last mutation timestamp (epoch millis)
    pub updated_at: i64,
}

impl Order {
    /// Create a new order with all items at `PENDING`
    pub fn new(table_number: impl Into<String>, items: Vec<OrderItem>, total_price: f64) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            table_number: table_number.into(),
            items,
            total_price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }

    /// Sum of line totals, the value `total_price` must match at creation
    pub fn computed_total(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn item(&self, item_id: &str) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut OrderItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// Recompute the derived status from item statuses and bump `updated_at`
    ///
    /// `PAID` is sticky: once closed, item mutations no longer affect the
    /// order status (they are rejected upstream anyway).
    pub fn recompute_status(&mut self) {
        if self.status != OrderStatus::Paid {
            self.status = derive_order_status(&self.items);
        }
        self.touch();
    }

    /// Bump `updated_at` to now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }
}

/// Derived order status: `PENDING` while any item is pending, `SERVED` once
/// all items are served, `COOKING` in between
pub fn derive_order_status(items: &[OrderItem]) -> OrderStatus {
    if items.iter().any(|i| i.status == ItemStatus::Pending) {
        OrderStatus::Pending
    } else if items.iter().all(|i| i.status == ItemStatus::Served) {
        OrderStatus::Served
    } else {
        OrderStatus::Cooking
    }
}

/// Item input for order creation (no id/status; the server assigns both)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItemInput {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    pub category: String,
}

impl OrderItemInput {
    /// Materialize into an [`OrderItem`] at `PENDING`
    pub fn into_item(self) -> OrderItem {
        OrderItem {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            quantity: self.quantity,
            price: self.price,
            category: self.category,
            status: ItemStatus::Pending,
        }
    }
}

/// Order creation payload
///
/// `client_id` identifies the table session holder and is revalidated at the
/// mutation boundary; `total_price` is checked against the computed sum to
/// reject tampered totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateOrderRequest {
    pub table_number: String,
    pub client_id: String,
    pub items: Vec<OrderItemInput>,
    pub total_price: f64,
}

/// Errors produced by the order lifecycle engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Malformed create-order payload (empty items, zero quantity, total mismatch)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Mutation attempted without holding the table session
    #[error("table session required: {0}")]
    SessionRequired(String),

    /// Another live client holds the table session
    #[error("table locked: {0}")]
    TableLocked(String),

    /// Transition outside the track's forward sequence
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Unknown order or item id
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying storage failure
    #[error("storage error: {0}")]
    Storage(String),
}
