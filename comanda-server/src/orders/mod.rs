//! Order state and lifecycle
//!
//! [`store`] keeps current order snapshots (in memory, write-through to
//! redb) and broadcasts change events; [`lifecycle`] validates and applies
//! every mutation on top of it. All consumers — HTTP handlers, the message
//! bus, tests — go through [`OrderLifecycle`]; nothing mutates the store
//! directly.

pub mod lifecycle;
pub mod store;

pub use lifecycle::OrderLifecycle;
pub use store::{OrderStore, StoreError, StoreResult};
