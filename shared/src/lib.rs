//! Shared types for the Comanda table-ordering engine
//!
//! Types that cross crate boundaries: the order/item model with its
//! preparation tracks, full-snapshot order events, the message bus
//! envelope, and the session/handshake payloads.

pub mod menu;
pub mod message;
pub mod order;
pub mod session;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{BusMessage, EventType};

// Order model re-exports
pub use order::{
    ItemStatus, LifecycleError, Order, OrderEvent, OrderEventKind, OrderItem, OrderStatus,
};
