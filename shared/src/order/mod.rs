//! Order domain model
//!
//! [`types`] holds the order/item model, preparation tracks and lifecycle
//! errors; [`event`] the full-snapshot change notifications broadcast to
//! observers.

pub mod event;
pub mod types;

pub use event::{OrderEvent, OrderEventKind};
pub use types::{
    CreateOrderRequest, DEFAULT_DRINK_CATEGORY, ItemStatus, LifecycleError, Order, OrderItem,
    OrderItemInput, OrderStatus, Track,
};
